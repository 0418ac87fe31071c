//! Shared serialization/deserialization utilities for configuration

/// Helper module for `Option<Duration>` serialization as whole seconds
///
/// An absent key or `0` both mean "no limit", which keeps TOML files free of
/// sentinel values.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(default, with = "sb_core::config::serde_utils::option_duration_secs")]
///     timeout: Option<Duration>,
/// }
/// ```
pub mod option_duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize an optional Duration as seconds, `None` as 0
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.map(|d| d.as_secs()).unwrap_or(0))
    }

    /// Deserialize seconds into an optional Duration, 0 meaning `None`
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(default, with = "option_duration_secs")]
        timeout: Option<Duration>,
    }

    #[test]
    fn test_option_duration_serialize() {
        let config = TestConfig {
            timeout: Some(Duration::from_secs(30)),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"timeout":30}"#);

        let config = TestConfig { timeout: None };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"timeout":0}"#);
    }

    #[test]
    fn test_option_duration_deserialize() {
        let config: TestConfig = serde_json::from_str(r#"{"timeout":60}"#).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));

        let config: TestConfig = serde_json::from_str(r#"{"timeout":0}"#).unwrap();
        assert_eq!(config.timeout, None);

        let config: TestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.timeout, None);
    }
}
