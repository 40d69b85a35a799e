//! MAC address normalisation.
//!
//! Every tool spells MACs a little differently (`52:54:00:AB:cd:01`,
//! `5254.00ab.cd01`, `52-54-00-ab-cd-01`). Fusion compares them as strings,
//! so all of them are folded into lower-case colon-separated form.

use std::sync::LazyLock;

use eui48::MacAddress;
use regex::Regex;

/// Accepted spellings. `MacAddress::parse_str` only checks the length and
/// skips separators wherever they appear, so the layout is checked first.
static MAC_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?i:[0-9a-f]{2}(?::[0-9a-f]{2}){5}|[0-9a-f]{2}(?:-[0-9a-f]{2}){5}|[0-9a-f]{4}(?:\.[0-9a-f]{4}){2})$",
    )
    .expect("Invalid MAC shape regex")
});

/// Normalise a MAC address, returning `None` for malformed, all-zero or
/// broadcast addresses (neither identifies a physical port).
pub fn normalize_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !MAC_SHAPE.is_match(raw) {
        return None;
    }

    let mac = MacAddress::parse_str(raw).ok()?;
    if mac.is_nil() || mac.is_broadcast() {
        return None;
    }
    Some(mac.to_hex_string())
}
