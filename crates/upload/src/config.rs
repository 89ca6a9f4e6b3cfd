//! Upload tuning knobs.

use std::time::Duration;

use blobsend_transfer::{DEFAULT_PART_SIZE, MAX_PARTS};
use serde::{Deserialize, Serialize};

/// Payloads larger than this use multipart upload.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 250 * 1024 * 1024;

/// Retries after the first failed attempt of a part.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base of the linear part-retry backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Configuration for one [`Uploader`](crate::Uploader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bytes per part; every part but the last is exactly this size.
    pub part_size: u64,
    /// Extra attempts per part after the first failure.
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * n`.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Largest payload still sent as a single request.
    pub multipart_threshold: u64,
    /// Parts uploaded at once.
    pub concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            concurrency: 1,
        }
    }
}

impl UploadConfig {
    /// Checks settings that do not depend on the payload.
    pub fn validate(&self) -> Result<(), String> {
        if self.part_size == 0 {
            return Err("part_size must be greater than zero".into());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be at least 1".into());
        }
        Ok(())
    }

    /// Checks that a payload of `total_size` bytes fits the part limit.
    pub fn validate_for(&self, total_size: u64) -> Result<(), String> {
        self.validate()?;
        let parts = total_size.div_ceil(self.part_size);
        if parts > u64::from(MAX_PARTS) {
            return Err(format!(
                "{total_size} bytes in {}-byte parts needs {parts} parts (max {MAX_PARTS})",
                self.part_size
            ));
        }
        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.part_size, 100 * 1024 * 1024);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_secs(2));
        assert_eq!(config.multipart_threshold, 250 * 1024 * 1024);
        assert_eq!(config.concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn linear_backoff() {
        let config = UploadConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(2));
        assert_eq!(config.retry_delay(2), Duration::from_secs(4));
        assert_eq!(config.retry_delay(3), Duration::from_secs(6));
    }

    #[test]
    fn rejects_zero_part_size_and_concurrency() {
        let config = UploadConfig {
            part_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = UploadConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_too_many_parts() {
        let config = UploadConfig {
            part_size: 1,
            ..Default::default()
        };
        assert!(config.validate_for(10_000).is_ok());
        assert!(config.validate_for(10_001).is_err());
    }

    #[test]
    fn json_uses_millis_and_defaults_missing_fields() {
        let config: UploadConfig =
            serde_json::from_str(r#"{"base_delay_ms": 250, "max_retries": 5}"#).unwrap();
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.part_size, DEFAULT_PART_SIZE);

        let json = serde_json::to_value(UploadConfig::default()).unwrap();
        assert_eq!(json["base_delay_ms"], 2000);
    }
}
