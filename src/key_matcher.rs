//! Summary key filtering.
//!
//! The simulator writes far more summary vectors than a history matching run
//! cares about. The matcher holds the configured key patterns (exact names or
//! shell-style wildcards such as `WOPR:*`) and decides which produced keys are
//! internalized. A pattern registered as *required* must be present in every
//! realization's output when an observation depends on it.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
struct KeyPattern {
    regex: Regex,
    required: bool,
}

fn invalid(pattern: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// Translates a shell wildcard (`*`, `?`, `[..]`, `[!..]`) into an anchored regex.
fn compile_wildcard(pattern: &str) -> Result<Regex, ConfigError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if matches!(c, '\\' | '[' | '^' | '&' | '~') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                if !closed {
                    return Err(invalid(pattern, "unterminated character class"));
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).map_err(|e| invalid(pattern, e.to_string()))
}

/// Registered summary key patterns with their required flag.
///
/// Mutated at configuration time only; ingestion reads it concurrently.
#[derive(Debug, Clone, Default)]
pub struct SummaryKeyMatcher {
    patterns: BTreeMap<String, KeyPattern>,
}

impl SummaryKeyMatcher {
    /// Creates an empty matcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pattern`.
    ///
    /// Registering an existing pattern again only ever raises its required
    /// flag; a required key stays required.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyKey`] for a blank pattern and
    /// [`ConfigError::InvalidPattern`] for a malformed wildcard.
    pub fn add_summary_key(&mut self, pattern: &str, required: bool) -> Result<(), ConfigError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ConfigError::EmptyKey);
        }

        if let Some(existing) = self.patterns.get_mut(pattern) {
            existing.required |= required;
            return Ok(());
        }

        let regex = compile_wildcard(pattern)?;
        self.patterns
            .insert(pattern.to_string(), KeyPattern { regex, required });
        Ok(())
    }

    /// Every registered pattern, sorted.
    #[must_use]
    pub fn registered_keys(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }

    /// Returns true if `key` is registered verbatim and marked required.
    #[must_use]
    pub fn is_required(&self, key: &str) -> bool {
        self.patterns.get(key).is_some_and(|p| p.required)
    }

    /// Returns true if `key` matches any registered pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.patterns.contains_key(key) || self.patterns.values().any(|p| p.regex.is_match(key))
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn size(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if no pattern is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let mut matcher = SummaryKeyMatcher::new();
        matcher.add_summary_key("FOPR", false).unwrap();
        assert!(matcher.matches("FOPR"));
        assert!(!matcher.matches("FOPRH"));
        assert!(!matcher.matches("fopr"));
    }

    #[test]
    fn test_wildcards() {
        let mut matcher = SummaryKeyMatcher::new();
        matcher.add_summary_key("WOPR:*", false).unwrap();
        matcher.add_summary_key("FG?R", false).unwrap();
        matcher.add_summary_key("WWCT:OP[12]", false).unwrap();

        assert!(matcher.matches("WOPR:OP1"));
        assert!(matcher.matches("WOPR:"));
        assert!(matcher.matches("FGPR"));
        assert!(!matcher.matches("FGPRH"));
        assert!(matcher.matches("WWCT:OP2"));
        assert!(!matcher.matches("WWCT:OP3"));
    }

    #[test]
    fn test_negated_class() {
        let mut matcher = SummaryKeyMatcher::new();
        matcher.add_summary_key("W[!G]PR:*", false).unwrap();
        assert!(matcher.matches("WOPR:OP1"));
        assert!(!matcher.matches("WGPR:OP1"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let mut matcher = SummaryKeyMatcher::new();
        matcher.add_summary_key("BPR:1,2,3", false).unwrap();
        matcher.add_summary_key("A.B", false).unwrap();
        assert!(matcher.matches("BPR:1,2,3"));
        assert!(matcher.matches("A.B"));
        assert!(!matcher.matches("AXB"));
    }

    #[test]
    fn test_required_is_sticky() {
        let mut matcher = SummaryKeyMatcher::new();
        matcher.add_summary_key("WWCT:WELL1", true).unwrap();
        matcher.add_summary_key("WWCT:WELL1", false).unwrap();
        matcher.add_summary_key("FOPR", false).unwrap();

        assert!(matcher.is_required("WWCT:WELL1"));
        assert!(!matcher.is_required("FOPR"));
        assert!(!matcher.is_required("WWCT:*"));
        assert_eq!(matcher.size(), 2);
    }

    #[test]
    fn test_registered_keys_sorted() {
        let mut matcher = SummaryKeyMatcher::new();
        matcher.add_summary_key("WOPR:*", false).unwrap();
        matcher.add_summary_key("FOPR", true).unwrap();
        assert_eq!(matcher.registered_keys(), vec!["FOPR", "WOPR:*"]);
    }

    #[test]
    fn test_invalid_patterns() {
        let mut matcher = SummaryKeyMatcher::new();
        assert!(matches!(
            matcher.add_summary_key("  ", false),
            Err(ConfigError::EmptyKey)
        ));
        assert!(matches!(
            matcher.add_summary_key("WOPR:[OP", false),
            Err(ConfigError::InvalidPattern { .. })
        ));
        assert!(matcher.is_empty());
    }
}
