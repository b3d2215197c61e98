//! Remote and local record shapes for the replicated CRM entity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

/// CRM object types mirrored into the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Contacts,
    Companies,
    Deals,
}

impl EntityType {
    /// Every replicated entity type, in status/report order.
    pub const ALL: [EntityType; 3] = [EntityType::Contacts, EntityType::Companies, EntityType::Deals];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Contacts => "contacts",
            EntityType::Companies => "companies",
            EntityType::Deals => "deals",
        }
    }

    /// Remote property holding the last-modified timestamp, used for incremental filters.
    pub fn last_modified_property(&self) -> &'static str {
        match self {
            EntityType::Contacts => "lastmodifieddate",
            EntityType::Companies | EntityType::Deals => "hs_lastmodifieddate",
        }
    }

    /// Related entity types resolved through the batch association API.
    pub fn associations(&self) -> &'static [EntityType] {
        match self {
            EntityType::Deals => &[EntityType::Companies, EntityType::Contacts],
            EntityType::Contacts | EntityType::Companies => &[],
        }
    }

    pub fn has_associations(&self) -> bool {
        !self.associations().is_empty()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "contacts" => Ok(EntityType::Contacts),
            "companies" => Ok(EntityType::Companies),
            "deals" => Ok(EntityType::Deals),
            other => Err(Error::Internal(format!("Unknown entity type '{}'", other))),
        }
    }
}

/// Replica-side freshness state of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSyncStatus {
    Synced,
    /// Not confirmed fresh within the freshness window.
    Pending,
    Error,
}

impl RecordSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSyncStatus::Synced => "synced",
            RecordSyncStatus::Pending => "pending",
            RecordSyncStatus::Error => "error",
        }
    }
}

impl FromStr for RecordSyncStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "synced" => Ok(RecordSyncStatus::Synced),
            "pending" => Ok(RecordSyncStatus::Pending),
            "error" => Ok(RecordSyncStatus::Error),
            other => Err(Error::Internal(format!("Unknown sync status '{}'", other))),
        }
    }
}

/// A record as returned by the remote CRM list/search endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One page of remote records plus the opaque cursor for the next page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePage {
    pub results: Vec<RemoteRecord>,
    pub next_cursor: Option<String>,
}

/// Related IDs for one parent record, keyed by related entity type.
pub type AssociationSet = BTreeMap<EntityType, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFields {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub lifecycle_stage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyFields {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub industry: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub employee_count: Option<i64>,
    pub annual_revenue: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealFields {
    pub deal_name: Option<String>,
    pub amount: Option<f64>,
    pub deal_stage: Option<String>,
    pub pipeline: Option<String>,
    pub close_date: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
    pub company_ids: Vec<String>,
    pub contact_ids: Vec<String>,
    pub is_closed: bool,
    pub is_won: bool,
    pub is_lost: bool,
}

/// Promoted, type-specific columns of a local record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordFields {
    Contact(ContactFields),
    Company(CompanyFields),
    Deal(DealFields),
}

impl RecordFields {
    pub fn entity_type(&self) -> EntityType {
        match self {
            RecordFields::Contact(_) => EntityType::Contacts,
            RecordFields::Company(_) => EntityType::Companies,
            RecordFields::Deal(_) => EntityType::Deals,
        }
    }
}

/// A replica record: remote data plus engine-owned sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub remote_id: String,
    pub fields: RecordFields,
    /// Every remote property outside the promoted set, preserved verbatim.
    pub properties: serde_json::Value,
    pub remote_created_at: Option<DateTime<Utc>>,
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
    pub sync_status: RecordSyncStatus,
}

impl LocalRecord {
    pub fn entity_type(&self) -> EntityType {
        self.fields.entity_type()
    }
}
