//! Interface exclusion patterns.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors raised while compiling exclusion patterns
#[derive(Debug, thiserror::Error)]
pub enum ExclusionError {
    #[error("invalid interface exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled set of interface-name patterns.
///
/// Patterns are anchored at the start of the name, so `docker` excludes
/// `docker0` but not `br-docker`. Use `.*docker` for a substring match.
///
/// Serializes as the list of patterns it was compiled from.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    sources: Vec<String>,
    patterns: Vec<Regex>,
}

impl ExclusionSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ExclusionError> {
        let sources: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        let patterns = sources
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{})", p)).map_err(|source| ExclusionError::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sources, patterns })
    }

    pub fn is_excluded(&self, interface: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(interface))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Patterns as written, before anchoring
    pub fn patterns(&self) -> &[String] {
        &self.sources
    }
}

impl PartialEq for ExclusionSet {
    fn eq(&self, other: &Self) -> bool {
        self.sources == other.sources
    }
}

impl Eq for ExclusionSet {}

impl Serialize for ExclusionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.sources.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExclusionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let sources = Vec::<String>::deserialize(deserializer)?;
        ExclusionSet::compile(&sources).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_anchor_at_start() {
        let set = ExclusionSet::compile(&["lo$", "docker", "veth.*"]).unwrap();

        assert!(set.is_excluded("lo"));
        assert!(!set.is_excluded("loop0"));
        assert!(set.is_excluded("docker0"));
        assert!(!set.is_excluded("br-docker"));
        assert!(set.is_excluded("veth12ab"));
        assert!(!set.is_excluded("eth0"));
    }

    #[test]
    fn test_empty_set_excludes_nothing() {
        let set = ExclusionSet::default();
        assert!(set.is_empty());
        assert!(!set.is_excluded("lo"));
    }

    #[test]
    fn test_serializes_as_source_patterns() {
        let set = ExclusionSet::compile(&["lo$", "docker"]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["lo$","docker"]"#);

        let back: ExclusionSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert!(back.is_excluded("docker0"));

        assert!(serde_json::from_str::<ExclusionSet>(r#"["eth[0-"]"#).is_err());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ExclusionSet::compile(&["eth[0-"]).unwrap_err();
        assert!(err.to_string().contains("eth[0-"));
    }
}
