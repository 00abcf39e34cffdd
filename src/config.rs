use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MtrError;

/// Default ICMP payload size in bytes
pub const DEFAULT_PAYLOAD_SIZE: usize = 32;

/// Runtime configuration for one MTR run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hostname or IPv4 address to trace
    pub target: String,
    /// Highest hop (TTL) probed every cycle
    pub max_hops: u8,
    /// How long each cycle waits for replies
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Pause between cycles
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    /// Number of cycles to run (0 = until cancelled)
    pub count: u64,
    /// Reverse-resolve hop addresses
    pub resolve_names: bool,
    /// Pacing delay between hop sends within a cycle
    #[serde(with = "duration_serde")]
    pub send_delay: Duration,
    /// ICMP payload size
    pub payload_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: String::new(),
            max_hops: 30,
            timeout: Duration::from_secs(2),
            interval: Duration::from_secs(1),
            count: 10,
            resolve_names: true,
            send_delay: Duration::from_millis(10),
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

impl Config {
    /// Default configuration for a target
    pub fn for_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> Result<(), MtrError> {
        if self.target.trim().is_empty() {
            return Err(MtrError::InvalidConfig("target must not be empty".into()));
        }
        if self.max_hops == 0 {
            return Err(MtrError::InvalidConfig("max hops must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(MtrError::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }

    /// True when the run has no cycle limit
    pub fn is_unbounded(&self) -> bool {
        self.count == 0
    }
}

/// Serde helper for Duration (fractional seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::for_target("example.com");
        assert_eq!(config.max_hops, 30);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.count, 10);
        assert!(config.resolve_names);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_hops() {
        let config = Config {
            max_hops: 0,
            ..Config::for_target("1.1.1.1")
        };
        assert!(matches!(config.validate(), Err(MtrError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_empty_target() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_unbounded_count() {
        let config = Config {
            count: 0,
            ..Config::for_target("1.1.1.1")
        };
        assert!(config.is_unbounded());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config {
            timeout: Duration::from_millis(1500),
            ..Config::for_target("example.com")
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
