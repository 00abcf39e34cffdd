pub mod hop;
pub mod result;

pub use hop::*;
pub use result::*;

/// Serde helper for Duration (integer microseconds)
///
/// `Duration::MAX` (the unset minimum RTT) maps to `u64::MAX` and back.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        micros.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        if micros == u64::MAX {
            Ok(Duration::MAX)
        } else {
            Ok(Duration::from_micros(micros))
        }
    }
}
