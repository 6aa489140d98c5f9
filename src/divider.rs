//! Divider prefix matching
//!
//! Patterns are literal text. They are escaped and combined into one
//! anchored alternation, so `.*` in a pattern only matches a name that
//! really starts with `.*`.

use regex::{Regex, RegexBuilder};

use crate::error::FoldError;

#[derive(Debug, Clone)]
pub struct DividerMatcher {
    regex: Option<Regex>,
    case_sensitive: bool,
}

impl DividerMatcher {
    /// Compile a matcher. Empty patterns are ignored; with none left the
    /// matcher matches nothing.
    pub fn compile<P: AsRef<str>>(patterns: &[P], case_sensitive: bool) -> Result<Self, FoldError> {
        let escaped: Vec<String> = patterns
            .iter()
            .map(|p| AsRef::<str>::as_ref(p))
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect();

        let regex = if escaped.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&format!("^(?:{})", escaped.join("|")))
                    .case_insensitive(!case_sensitive)
                    .build()?,
            )
        };

        Ok(Self {
            regex,
            case_sensitive,
        })
    }

    /// A matcher that never classifies anything as a header
    pub fn empty() -> Self {
        Self {
            regex: None,
            case_sensitive: false,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(name))
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_any_prefix() {
        let matcher = DividerMatcher::compile(&["=", "-"], false).unwrap();
        assert!(matcher.matches("=Intro"));
        assert!(matcher.matches("--- Rules ---"));
        assert!(!matcher.matches("Intro ="));
        assert!(!matcher.matches(""));
    }

    #[test]
    fn test_special_characters_are_literal() {
        let matcher = DividerMatcher::compile(&[".*", "[x]", "(a|b)"], false).unwrap();
        assert!(matcher.matches(".* header"));
        assert!(matcher.matches("[x] section"));
        assert!(matcher.matches("(a|b) both"));
        assert!(!matcher.matches("anything"));
        assert!(!matcher.matches("x section"));
        assert!(!matcher.matches("a section"));
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let matcher = DividerMatcher::compile(&["SECTION:"], false).unwrap();
        assert!(matcher.matches("section: lore"));
        assert!(!matcher.is_case_sensitive());
    }

    #[test]
    fn test_case_sensitive_when_requested() {
        let matcher = DividerMatcher::compile(&["SECTION:"], true).unwrap();
        assert!(matcher.matches("SECTION: lore"));
        assert!(!matcher.matches("section: lore"));
    }

    #[test]
    fn test_empty_patterns_match_nothing() {
        let none: [&str; 0] = [];
        assert!(!DividerMatcher::compile(&none, false).unwrap().matches("=x"));
        assert!(!DividerMatcher::compile(&[""], false).unwrap().matches("anything"));
        assert!(!DividerMatcher::empty().matches("=x"));
    }
}
