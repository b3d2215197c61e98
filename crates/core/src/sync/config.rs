//! Static tuning for the sync engine.

use chrono::{DateTime, Duration, Utc};

use crate::entities::EntityType;
use crate::errors::{Error, Result};

/// Remote page size for list and search calls.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Records per bulk write for entity types without associations.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Records per bulk write for relationship-bearing entity types.
pub const DEFAULT_ASSOCIATION_BATCH_SIZE: usize = 100;

/// Default staleness window in hours for full syncs and incremental look-back.
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

/// Largest accepted age window (ten years), for both staleness and incremental look-back.
pub const MAX_AGE_HOURS_LIMIT: i64 = 24 * 365 * 10;

/// Scheduler cadence for periodic ensure/incremental passes.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub page_size: usize,
    pub batch_size: usize,
    pub association_batch_size: usize,
    pub max_age_hours: i64,
    /// Freshness window used by the staleness sweep.
    pub stale_after_hours: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            association_batch_size: DEFAULT_ASSOCIATION_BATCH_SIZE,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            stale_after_hours: DEFAULT_MAX_AGE_HOURS,
        }
    }
}

impl SyncConfig {
    pub fn batch_size_for(&self, entity: EntityType) -> usize {
        if entity.has_associations() {
            self.association_batch_size
        } else {
            self.batch_size
        }
    }

    pub fn stale_after(&self) -> Result<Duration> {
        age_window(self.stale_after_hours)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::config("page_size must be greater than zero"));
        }
        if self.batch_size == 0 || self.association_batch_size == 0 {
            return Err(Error::config("batch sizes must be greater than zero"));
        }
        age_window(self.max_age_hours)?;
        age_window(self.stale_after_hours)?;
        Ok(())
    }
}

/// `hours` as a duration, rejected unless it lies in `1..=MAX_AGE_HOURS_LIMIT`.
pub fn age_window(hours: i64) -> Result<Duration> {
    if !(1..=MAX_AGE_HOURS_LIMIT).contains(&hours) {
        return Err(Error::config(format!(
            "max age must be between 1 and {} hours, got {}",
            MAX_AGE_HOURS_LIMIT, hours
        )));
    }
    Duration::try_hours(hours)
        .ok_or_else(|| Error::config(format!("max age of {} hours is out of range", hours)))
}

/// `now - hours`, or a configuration error when the window is out of range.
pub fn age_cutoff(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(age_window(hours)?)
        .ok_or_else(|| Error::config(format!("max age of {} hours is out of range", hours)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deals_use_the_smaller_batch_size() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size_for(EntityType::Deals), 100);
        assert_eq!(config.batch_size_for(EntityType::Contacts), 500);
        assert_eq!(config.batch_size_for(EntityType::Companies), 500);
    }

    #[test]
    fn validate_rejects_zero_page_size() {
        let config = SyncConfig {
            page_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_caps_age_windows() {
        let huge = SyncConfig {
            max_age_hours: 10_000_000_000,
            ..SyncConfig::default()
        };
        assert!(matches!(huge.validate(), Err(Error::Config(_))));

        let zero_sweep = SyncConfig {
            stale_after_hours: 0,
            ..SyncConfig::default()
        };
        assert!(zero_sweep.validate().is_err());
    }

    #[test]
    fn age_window_rejects_values_chrono_cannot_hold() {
        assert_eq!(age_window(24).unwrap(), Duration::hours(24));
        assert!(age_window(MAX_AGE_HOURS_LIMIT).is_ok());
        assert!(age_window(MAX_AGE_HOURS_LIMIT + 1).is_err());
        assert!(age_window(i64::MAX).is_err());
        assert!(age_window(-5).is_err());
        assert!(age_cutoff(Utc::now(), i64::MAX).is_err());
    }
}
