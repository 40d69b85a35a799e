//! Duration values in the inventory and on the command line.
//!
//! Accepts raw seconds (`10`, `"10"`) as well as humantime strings
//! (`"30s"`, `"5m"`, `"1h 30m"`).

use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serializer};

/// Parse a duration string: a bare number is seconds, anything else goes
/// through humantime.
///
/// ```
/// use linkscope::utils::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("90"), Ok(Duration::from_secs(90)));
/// assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(raw).map_err(|e| format!("Invalid duration '{}': {}", raw, e))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration<E: de::Error>(self) -> Result<Duration, E> {
        match self {
            RawDuration::Seconds(s) => Ok(Duration::from_secs(s)),
            RawDuration::Text(t) => parse_duration(&t).map_err(E::custom),
        }
    }
}

/// `#[serde(with = "...")]` adapter for `Duration` fields
pub mod serde_duration {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(deserializer)?.into_duration()
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }
}

/// `#[serde(with = "...")]` adapter for `Option<Duration>` fields
pub mod serde_duration_opt {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<RawDuration>::deserialize(deserializer)?
            .map(RawDuration::into_duration)
            .transpose()
    }

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }
}
