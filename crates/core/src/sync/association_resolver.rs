//! Bulk resolution of cross-entity relationships.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{AssociationSet, EntityType};

use super::traits::CrmRemoteTrait;

/// Resolves related IDs with one remote call per relationship type, not per parent.
#[derive(Clone)]
pub struct AssociationResolver {
    remote: Arc<dyn CrmRemoteTrait>,
}

impl AssociationResolver {
    pub fn new(remote: Arc<dyn CrmRemoteTrait>) -> Self {
        Self { remote }
    }

    /// Every requested parent ID is present in the result, with an empty list for each
    /// relationship type that has no links or whose batch call failed. Failures are logged
    /// and never propagated.
    pub async fn resolve_associations(
        &self,
        parent: EntityType,
        parent_ids: &[String],
        relationships: &[EntityType],
    ) -> HashMap<String, AssociationSet> {
        let mut resolved: HashMap<String, AssociationSet> = parent_ids
            .iter()
            .map(|id| {
                let empty = relationships
                    .iter()
                    .map(|target| (*target, Vec::new()))
                    .collect::<AssociationSet>();
                (id.clone(), empty)
            })
            .collect();

        if parent_ids.is_empty() {
            return resolved;
        }

        for target in relationships {
            match self
                .remote
                .read_associations(parent, *target, parent_ids)
                .await
            {
                Ok(links) => {
                    let mut linked = 0usize;
                    for (parent_id, related) in links {
                        // Answers for IDs we never asked about are ignored.
                        if let Some(set) = resolved.get_mut(&parent_id) {
                            linked += related.len();
                            set.insert(*target, related);
                        }
                    }
                    debug!(
                        "[CrmSync] Resolved {} {}→{} links for {} parents",
                        linked,
                        parent,
                        target,
                        parent_ids.len()
                    );
                }
                Err(err) => {
                    warn!(
                        "[CrmSync] Association lookup {}→{} failed for {} parents, defaulting to empty: {}",
                        parent,
                        target,
                        parent_ids.len(),
                        err
                    );
                }
            }
        }

        resolved
    }
}
