//! Remote → local field mapping for each entity type.

use chrono::{DateTime, NaiveDate, Utc};

use super::model::{
    AssociationSet, CompanyFields, ContactFields, DealFields, EntityType, LocalRecord,
    RecordFields, RecordSyncStatus, RemoteRecord,
};

const CONTACT_PROPERTIES: [&str; 7] = [
    "email",
    "firstname",
    "lastname",
    "phone",
    "company",
    "jobtitle",
    "lifecyclestage",
];

const COMPANY_PROPERTIES: [&str; 8] = [
    "name",
    "domain",
    "industry",
    "city",
    "country",
    "phone",
    "numberofemployees",
    "annualrevenue",
];

const DEAL_PROPERTIES: [&str; 6] = [
    "dealname",
    "amount",
    "dealstage",
    "pipeline",
    "closedate",
    "hubspot_owner_id",
];

const CLOSED_WON_STAGE: &str = "closedwon";
const CLOSED_LOST_STAGE: &str = "closedlost";

/// Remote properties promoted to typed local columns.
pub fn promoted_properties(entity: EntityType) -> &'static [&'static str] {
    match entity {
        EntityType::Contacts => &CONTACT_PROPERTIES,
        EntityType::Companies => &COMPANY_PROPERTIES,
        EntityType::Deals => &DEAL_PROPERTIES,
    }
}

/// Properties requested from the remote API: promoted fields plus the last-modified marker.
pub fn requested_properties(entity: EntityType) -> Vec<String> {
    let mut properties: Vec<String> = promoted_properties(entity)
        .iter()
        .map(|p| p.to_string())
        .collect();
    properties.push(entity.last_modified_property().to_string());
    properties
}

/// Closed/won/lost flags derived from a deal stage.
pub fn deal_stage_flags(stage: Option<&str>) -> (bool, bool, bool) {
    let stage = stage.map(|s| s.trim().to_ascii_lowercase()).unwrap_or_default();
    let is_won = stage == CLOSED_WON_STAGE;
    let is_lost = stage == CLOSED_LOST_STAGE;
    (is_won || is_lost, is_won, is_lost)
}

fn text(record: &RemoteRecord, key: &str) -> Option<String> {
    match record.properties.get(key)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(value) => {
            let value = value.trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }
        other => Some(other.to_string()),
    }
}

fn float(record: &RemoteRecord, key: &str) -> Option<f64> {
    text(record, key).and_then(|v| v.parse::<f64>().ok())
}

fn integer(record: &RemoteRecord, key: &str) -> Option<i64> {
    let value = text(record, key)?;
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|f| f.round() as i64))
}

/// Parses CRM date properties: RFC 3339, epoch millis, or a bare date.
fn timestamp(record: &RemoteRecord, key: &str) -> Option<DateTime<Utc>> {
    let value = text(record, key)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn build_fields(
    entity: EntityType,
    record: &RemoteRecord,
    associations: Option<&AssociationSet>,
) -> RecordFields {
    match entity {
        EntityType::Contacts => RecordFields::Contact(ContactFields {
            email: text(record, "email"),
            first_name: text(record, "firstname"),
            last_name: text(record, "lastname"),
            phone: text(record, "phone"),
            company_name: text(record, "company"),
            job_title: text(record, "jobtitle"),
            lifecycle_stage: text(record, "lifecyclestage"),
        }),
        EntityType::Companies => RecordFields::Company(CompanyFields {
            name: text(record, "name"),
            domain: text(record, "domain"),
            industry: text(record, "industry"),
            city: text(record, "city"),
            country: text(record, "country"),
            phone: text(record, "phone"),
            employee_count: integer(record, "numberofemployees"),
            annual_revenue: float(record, "annualrevenue"),
        }),
        EntityType::Deals => {
            let deal_stage = text(record, "dealstage");
            let (is_closed, is_won, is_lost) = deal_stage_flags(deal_stage.as_deref());
            let related = |target: EntityType| {
                associations
                    .and_then(|set| set.get(&target))
                    .cloned()
                    .unwrap_or_default()
            };
            RecordFields::Deal(DealFields {
                deal_name: text(record, "dealname"),
                amount: float(record, "amount"),
                deal_stage,
                pipeline: text(record, "pipeline"),
                close_date: timestamp(record, "closedate"),
                owner_id: text(record, "hubspot_owner_id"),
                company_ids: related(EntityType::Companies),
                contact_ids: related(EntityType::Contacts),
                is_closed,
                is_won,
                is_lost,
            })
        }
    }
}

/// Transforms a remote record into its local replica shape, stamped as synced at `now`.
pub fn to_local_record(
    entity: EntityType,
    record: RemoteRecord,
    associations: Option<&AssociationSet>,
    now: DateTime<Utc>,
) -> LocalRecord {
    let fields = build_fields(entity, &record, associations);
    let promoted = promoted_properties(entity);
    let properties = record
        .properties
        .into_iter()
        .filter(|(key, _)| !promoted.contains(&key.as_str()))
        .collect::<serde_json::Map<_, _>>();

    LocalRecord {
        remote_id: record.id,
        fields,
        properties: serde_json::Value::Object(properties),
        remote_created_at: record.created_at,
        remote_updated_at: record.updated_at,
        last_synced_at: now,
        sync_status: RecordSyncStatus::Synced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(id: &str, properties: serde_json::Value) -> RemoteRecord {
        RemoteRecord {
            id: id.to_string(),
            properties: properties.as_object().cloned().unwrap_or_default(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn deal_stage_flags_follow_closed_stages() {
        assert_eq!(deal_stage_flags(Some("closedwon")), (true, true, false));
        assert_eq!(deal_stage_flags(Some("ClosedLost")), (true, false, true));
        assert_eq!(deal_stage_flags(Some("appointmentscheduled")), (false, false, false));
        assert_eq!(deal_stage_flags(None), (false, false, false));
    }

    #[test]
    fn contact_promotes_fields_and_keeps_the_rest_opaque() {
        let now = Utc::now();
        let record = to_local_record(
            EntityType::Contacts,
            remote(
                "c-1",
                json!({
                    "email": "ada@example.com",
                    "firstname": "Ada",
                    "lastname": "",
                    "hs_lead_status": "OPEN",
                    "lastmodifieddate": "2025-03-01T00:00:00Z"
                }),
            ),
            None,
            now,
        );

        let RecordFields::Contact(fields) = &record.fields else {
            panic!("expected contact fields");
        };
        assert_eq!(fields.email.as_deref(), Some("ada@example.com"));
        assert_eq!(fields.first_name.as_deref(), Some("Ada"));
        assert_eq!(fields.last_name, None);
        assert_eq!(record.properties["hs_lead_status"], "OPEN");
        assert!(record.properties.get("email").is_none());
        assert_eq!(record.last_synced_at, now);
        assert_eq!(record.sync_status, RecordSyncStatus::Synced);
    }

    #[test]
    fn company_numbers_tolerate_bad_values() {
        let record = to_local_record(
            EntityType::Companies,
            remote(
                "co-1",
                json!({ "name": "Acme", "numberofemployees": "120.0", "annualrevenue": "n/a" }),
            ),
            None,
            Utc::now(),
        );
        let RecordFields::Company(fields) = record.fields else {
            panic!("expected company fields");
        };
        assert_eq!(fields.employee_count, Some(120));
        assert_eq!(fields.annual_revenue, None);
    }

    #[test]
    fn deal_carries_associations_and_derived_flags() {
        let mut associations = AssociationSet::new();
        associations.insert(EntityType::Companies, vec!["co-9".to_string()]);
        associations.insert(EntityType::Contacts, vec!["c-1".to_string(), "c-2".to_string()]);

        let record = to_local_record(
            EntityType::Deals,
            remote(
                "d-1",
                json!({
                    "dealname": "Renewal",
                    "amount": "1500.50",
                    "dealstage": "closedwon",
                    "closedate": "2025-04-30T12:00:00.000Z"
                }),
            ),
            Some(&associations),
            Utc::now(),
        );
        let RecordFields::Deal(fields) = record.fields else {
            panic!("expected deal fields");
        };
        assert_eq!(fields.amount, Some(1500.5));
        assert!(fields.is_closed && fields.is_won && !fields.is_lost);
        assert_eq!(fields.company_ids, vec!["co-9"]);
        assert_eq!(fields.contact_ids, vec!["c-1", "c-2"]);
        assert!(fields.close_date.is_some());
    }

    #[test]
    fn deal_without_associations_gets_empty_sets() {
        let record = to_local_record(
            EntityType::Deals,
            remote("d-2", json!({ "closedate": "1735689600000" })),
            None,
            Utc::now(),
        );
        let RecordFields::Deal(fields) = record.fields else {
            panic!("expected deal fields");
        };
        assert!(fields.company_ids.is_empty());
        assert!(fields.contact_ids.is_empty());
        assert_eq!(
            fields.close_date.map(|d| d.timestamp_millis()),
            Some(1_735_689_600_000)
        );
    }

    #[test]
    fn requested_properties_include_last_modified_marker() {
        let props = requested_properties(EntityType::Deals);
        assert!(props.contains(&"dealstage".to_string()));
        assert!(props.contains(&"hs_lastmodifieddate".to_string()));
    }
}
