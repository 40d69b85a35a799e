//! Shared utilities: MAC normalisation, interface exclusion patterns and
//! duration parsing.

pub mod duration;
pub mod exclusion;
pub mod mac;

pub use duration::parse_duration;
pub use exclusion::{ExclusionError, ExclusionSet};
pub use mac::normalize_mac;
