//! Configuration types for a crisis cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Knobs for one run of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Maximum Ruler consultation turns before a directive is demanded
    pub max_consultations: usize,

    /// Salary budget the Ruler allocates after an approved directive
    pub budget: u32,

    /// Extra attempts after a failed generation call (0 = no retries)
    pub generation_retries: u32,

    /// Pause before retry `n` is `retry_backoff * n`
    #[serde(with = "millis")]
    pub retry_backoff: Duration,

    /// Upper bound on a single generation call
    #[serde(with = "millis")]
    pub generation_timeout: Duration,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_consultations: 10,
            budget: 700,
            generation_retries: 2,
            retry_backoff: Duration::from_secs(2),
            generation_timeout: Duration::from_secs(180),
        }
    }
}

impl CycleConfig {
    /// Total attempts allowed per generation call.
    pub fn max_attempts(&self) -> u32 {
        self.generation_retries.saturating_add(1)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CycleConfig::default();
        assert_eq!(config.budget, 700);
        assert_eq!(config.max_consultations, 10);
        assert_eq!(config.max_attempts(), 3);
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let config = CycleConfig {
            retry_backoff: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["retry_backoff"], 1500);

        let back: CycleConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.retry_backoff, Duration::from_millis(1500));
    }
}
