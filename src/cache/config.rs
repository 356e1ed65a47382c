//! Cache rebuild configuration.
//!
//! Controls the worker pool, the per-task deadline and the normalization
//! defaults applied while aggregating entities.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::geometry::AxisNormalizer;

// Default values for cache configuration
const DEFAULT_THREADS: usize = 5;
const DEFAULT_TASK_DEADLINE_SECONDS: u64 = 120;
const DEFAULT_LOCALE: &str = "eng";
const DEFAULT_SRID: i32 = 4326;
const DEFAULT_NORTHING_FIRST_SRIDS: [i32; 2] = [4326, 4258];

/// What to do with a rebuild that recorded failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// Publish the degraded cache.
    #[default]
    Publish,
    /// Keep serving the previous snapshot.
    RetainPrevious,
}

impl DegradedPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            DegradedPolicy::Publish => "publish",
            DegradedPolicy::RetainPrevious => "retain_previous",
        }
    }
}

impl TryFrom<&str> for DegradedPolicy {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "publish" => Ok(DegradedPolicy::Publish),
            "retain_previous" | "retain-previous" => Ok(DegradedPolicy::RetainPrevious),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Worker threads for per-instance tasks.
    pub threads: usize,
    /// Per-task deadline in seconds; 0 disables it.
    pub task_deadline_seconds: u64,
    /// Locale of the single display name recorded per entity.
    pub default_locale: String,
    /// SRID assumed for geometries stored without one.
    pub default_srid: i32,
    /// SRIDs whose axes are swapped before envelopes are computed.
    pub northing_first_srids: Vec<i32>,
    pub degraded_policy: DegradedPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            task_deadline_seconds: DEFAULT_TASK_DEADLINE_SECONDS,
            default_locale: DEFAULT_LOCALE.to_string(),
            default_srid: DEFAULT_SRID,
            northing_first_srids: DEFAULT_NORTHING_FIRST_SRIDS.to_vec(),
            degraded_policy: DegradedPolicy::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            threads: settings.threads.get(),
            task_deadline_seconds: settings.task_deadline_seconds,
            default_locale: settings.default_locale.clone(),
            default_srid: settings.default_srid,
            northing_first_srids: settings.northing_first_srids.clone(),
            degraded_policy: settings.degraded_policy,
        }
    }
}

impl CacheConfig {
    /// Returns the thread count as NonZeroUsize, clamping to 1 if zero.
    pub fn threads_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.threads).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn task_deadline(&self) -> Option<Duration> {
        (self.task_deadline_seconds > 0).then(|| Duration::from_secs(self.task_deadline_seconds))
    }

    pub fn axis_normalizer(&self) -> AxisNormalizer {
        AxisNormalizer::new(self.default_srid, self.northing_first_srids.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.threads, 5);
        assert_eq!(config.task_deadline(), Some(Duration::from_secs(120)));
        assert_eq!(config.default_locale, "eng");
        assert_eq!(config.default_srid, 4326);
        assert_eq!(config.northing_first_srids, vec![4326, 4258]);
        assert_eq!(config.degraded_policy, DegradedPolicy::Publish);
    }

    #[test]
    fn zero_deadline_disables_it() {
        let config = CacheConfig {
            task_deadline_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.task_deadline(), None);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            threads: 0,
            ..Default::default()
        };
        assert_eq!(config.threads_non_zero().get(), 1);
    }

    #[test]
    fn degraded_policy_parses_both_spellings() {
        assert_eq!(
            DegradedPolicy::try_from("retain-previous"),
            Ok(DegradedPolicy::RetainPrevious)
        );
        assert_eq!(DegradedPolicy::try_from(" Publish "), Ok(DegradedPolicy::Publish));
        assert!(DegradedPolicy::try_from("drop").is_err());
    }
}
