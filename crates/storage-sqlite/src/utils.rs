//! Column encoding helpers shared by the repositories.

use chrono::{DateTime, SecondsFormat, Utc};

use crm_replica_core::Result;

use crate::errors::StorageError;

/// Fixed-width RFC 3339 (microseconds, `Z`), so text order matches time order.
pub fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn timestamp_opt_to_db(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(timestamp_to_db)
}

pub fn timestamp_from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StorageError::Serialization(format!("Invalid timestamp '{}': {}", value, e)).into()
        })
}

pub fn timestamp_opt_from_db(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(timestamp_from_db).transpose()
}

pub fn json_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn json_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);
        assert!(timestamp_to_db(earlier) < timestamp_to_db(later));
        assert_eq!(timestamp_to_db(earlier), "2025-01-01T09:00:00.000000Z");
    }

    #[test]
    fn timestamps_round_trip_at_microsecond_precision() {
        let value = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(timestamp_from_db(&timestamp_to_db(value)).unwrap(), value);
        assert!(timestamp_from_db("yesterday").is_err());
    }
}
