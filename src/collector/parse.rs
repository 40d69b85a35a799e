//! Tolerant line-oriented parsing support.
//!
//! Probe parsers never fail as a whole: each line either yields a fact or a
//! [`ParseWarning`], and the caller decides what to do with the warnings.

use log::debug;

/// A single line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the command output
    pub line_no: usize,
    pub line: String,
    pub reason: &'static str,
}

/// Facts extracted from one command output, plus the lines that were skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub facts: Vec<T>,
    pub warnings: Vec<ParseWarning>,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self { facts: Vec::new(), warnings: Vec::new() }
    }
}

impl<T> Parsed<T> {
    pub fn push(&mut self, fact: T) {
        self.facts.push(fact);
    }

    pub fn skip(&mut self, line_no: usize, line: &str, reason: &'static str) {
        debug!("Skipping line {} ({}): {}", line_no, reason, line);
        self.warnings.push(ParseWarning { line_no, line: line.to_string(), reason });
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Iterate over the non-blank lines of `output` with 1-based line numbers
pub fn content_lines(output: &str) -> impl Iterator<Item = (usize, &str)> {
    output
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end()))
        .filter(|(_, line)| !line.trim().is_empty())
}

/// Interface names that are safe to splice into a remote shell command
pub fn is_safe_ifname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '@'))
}

/// Strip the `@parent` suffix `ip` appends to VLAN and veth names
pub fn base_ifname(name: &str) -> &str {
    name.split('@').next().unwrap_or(name)
}
