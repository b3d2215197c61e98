//! Request and response types for the CRM object, search and association APIs.

use chrono::{DateTime, Utc};
use crm_replica_core::entities::RemoteRecord;
use serde::{Deserialize, Deserializer, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Objects
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmObject {
    pub id: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived: bool,
}

impl From<CrmObject> for RemoteRecord {
    fn from(object: CrmObject) -> Self {
        RemoteRecord {
            id: object.id,
            properties: object.properties,
            created_at: object.created_at,
            updated_at: object.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextPage {
    pub after: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paging {
    pub next: Option<NextPage>,
}

/// Page shape shared by the list and search endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectPageResponse {
    #[serde(default)]
    pub results: Vec<CrmObject>,
    pub paging: Option<Paging>,
}

impl ObjectPageResponse {
    pub fn next_cursor(&self) -> Option<String> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .map(|n| n.after.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Search
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    pub property_name: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilterGroup {
    pub filters: Vec<SearchFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSort {
    pub property_name: String,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<SearchFilterGroup>,
    pub sorts: Vec<SearchSort>,
    pub properties: Vec<String>,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl SearchRequest {
    /// Records whose `property` is at or after `since`, oldest first.
    pub fn modified_since(
        property: &str,
        since: DateTime<Utc>,
        properties: Vec<String>,
        limit: usize,
        after: Option<String>,
    ) -> Self {
        Self {
            filter_groups: vec![SearchFilterGroup {
                filters: vec![SearchFilter {
                    property_name: property.to_string(),
                    operator: "GTE".to_string(),
                    value: since.timestamp_millis().to_string(),
                }],
            }],
            sorts: vec![SearchSort {
                property_name: property.to_string(),
                direction: "ASCENDING".to_string(),
            }],
            properties,
            limit,
            after,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Associations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInput {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReadRequest {
    pub inputs: Vec<BatchInput>,
}

impl BatchReadRequest {
    pub fn for_ids(ids: &[String]) -> Self {
        Self {
            inputs: ids.iter().map(|id| BatchInput { id: id.clone() }).collect(),
        }
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(value) => value,
        RawId::Number(value) => value.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationFrom {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationTo {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub to_object_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationResult {
    pub from: AssociationFrom,
    #[serde(default)]
    pub to: Vec<AssociationTo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchAssociationResponse {
    #[serde(default)]
    pub results: Vec<AssociationResult>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub category: Option<String>,
    pub message: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn association_ids_accept_numbers_and_strings() {
        let body = r#"{
            "results": [
                { "from": { "id": "101" }, "to": [ { "toObjectId": 7 }, { "toObjectId": "8" } ] }
            ]
        }"#;
        let parsed: BatchAssociationResponse = serde_json::from_str(body).unwrap();
        let ids = parsed.results[0]
            .to
            .iter()
            .map(|t| t.to_object_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["7", "8"]);
    }

    #[test]
    fn search_request_filters_on_epoch_millis() {
        let since = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let request = SearchRequest::modified_since(
            "hs_lastmodifieddate",
            since,
            vec!["dealname".to_string()],
            100,
            None,
        );
        let value = serde_json::to_value(&request).unwrap();
        let filter = &value["filterGroups"][0]["filters"][0];
        assert_eq!(filter["propertyName"], "hs_lastmodifieddate");
        assert_eq!(filter["operator"], "GTE");
        assert_eq!(filter["value"], "1735689600000");
        assert!(value.get("after").is_none());
    }

    #[test]
    fn last_page_has_no_cursor() {
        let page: ObjectPageResponse =
            serde_json::from_str(r#"{ "results": [ { "id": "1", "properties": {} } ] }"#).unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(page.next_cursor().is_none());
    }
}
