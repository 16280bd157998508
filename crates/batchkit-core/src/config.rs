//! Configuration for the batch scheduler.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Batcher configuration.
///
/// Deserializes from JSON with every field optional:
/// ```json
/// { "delay_ms": 5, "parallel": false, "limit": 100 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Milliseconds to wait for additional input before a batch is evaluated
    /// for dispatch. `0` still defers to the next scheduling opportunity.
    pub delay_ms: u64,
    /// Allow more than one batch in flight at a time.
    pub parallel: bool,
    /// Maximum distinct keys per batch (`None` = unbounded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            parallel: false,
            limit: None,
        }
    }
}

impl BatcherConfig {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The debounce delay as a `Duration`.
    pub fn delay_duration(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Effective per-batch key cap.
    pub(crate) fn max_keys(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }

    /// Reject configurations the scheduler cannot honour.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.limit == Some(0) {
            return Err(BatchError::InvalidConfig(
                "limit must be a positive integer".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(s: &str) -> Result<Self, BatchError> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| BatchError::InvalidConfig(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BatchError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = BatcherConfig::default();
        assert_eq!(c.delay_duration(), Duration::ZERO);
        assert!(!c.parallel);
        assert_eq!(c.limit, None);
        assert_eq!(c.max_keys(), usize::MAX);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn builder_setters() {
        let c = BatcherConfig::default()
            .delay(Duration::from_millis(25))
            .parallel(true)
            .limit(10);
        assert_eq!(c.delay_ms, 25);
        assert!(c.parallel);
        assert_eq!(c.max_keys(), 10);
    }

    #[test]
    fn zero_limit_rejected() {
        let err = BatcherConfig::default().limit(0).validate().unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)));
    }

    #[test]
    fn json_partial_fields_use_defaults() {
        let c = BatcherConfig::from_json_str(r#"{ "limit": 2 }"#).unwrap();
        assert_eq!(c, BatcherConfig::default().limit(2));

        let c = BatcherConfig::from_json_str("{}").unwrap();
        assert_eq!(c, BatcherConfig::default());
    }

    #[test]
    fn json_invalid_values_rejected() {
        assert!(BatcherConfig::from_json_str(r#"{ "limit": 0 }"#).is_err());
        assert!(BatcherConfig::from_json_str(r#"{ "delay_ms": -1 }"#).is_err());
        assert!(BatcherConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = BatcherConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)));
    }
}
