//! Pattern compilation.
//!
//! A command declares a list of raw patterns and a [`MatchMode`]. Compiling
//! them produces a [`PatternSet`], which matches a text when **any** of its
//! patterns does:
//!
//! | mode | raw `p` becomes | matches |
//! |------|-----------------|---------|
//! | [`Full`](MatchMode::Full) | `^(?:p)$` | the whole text, exactly |
//! | [`Regex`](MatchMode::Regex) | `p` | wherever the regex matches |
//! | [`Keyword`](MatchMode::Keyword) | `[p]+` | any text containing one of the characters of `p` |
//!
//! Keyword mode is a character-class test, not substring search: the
//! keyword `"ab"` matches `"b"` and `"ba"`.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};

use crate::error::{PatternError, PatternResult};

/// How raw patterns are turned into regular expressions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// The text must equal the pattern.
    #[default]
    Full,
    /// The pattern is a regular expression.
    Regex,
    /// The text must contain at least one character of the pattern.
    Keyword,
}

impl MatchMode {
    /// Expands a raw pattern into the regular expression for this mode.
    pub fn expand(&self, raw: &str) -> String {
        match self {
            Self::Full => format!("^(?:{raw})$"),
            Self::Regex => raw.to_string(),
            Self::Keyword => format!("[{raw}]+"),
        }
    }

    /// Returns the lowercase name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Regex => "regex",
            Self::Keyword => "keyword",
        }
    }
}

impl FromStr for MatchMode {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "regex" => Ok(Self::Regex),
            "keyword" => Ok(Self::Keyword),
            other => Err(PatternError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regex options applied to every pattern of a set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MatchFlags {
    /// Match letters regardless of case.
    pub case_insensitive: bool,
    /// `^` and `$` match at line boundaries.
    pub multi_line: bool,
    /// `.` also matches `\n`.
    pub dot_matches_new_line: bool,
    /// Whitespace and `#` comments in the pattern are ignored.
    pub ignore_whitespace: bool,
}

impl MatchFlags {
    /// No options.
    pub const NONE: Self = Self {
        case_insensitive: false,
        multi_line: false,
        dot_matches_new_line: false,
        ignore_whitespace: false,
    };

    /// Case-insensitive matching only.
    pub const IGNORE_CASE: Self = Self {
        case_insensitive: true,
        ..Self::NONE
    };

    fn builder(&self, pattern: &str) -> RegexBuilder {
        let mut builder = RegexBuilder::new(pattern);
        builder
            .case_insensitive(self.case_insensitive)
            .multi_line(self.multi_line)
            .dot_matches_new_line(self.dot_matches_new_line)
            .ignore_whitespace(self.ignore_whitespace);
        builder
    }
}

/// A non-empty, ordered set of compiled patterns.
#[derive(Clone)]
pub struct PatternSet {
    mode: MatchMode,
    flags: MatchFlags,
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compiles `raw` patterns under `mode` and `flags`.
    ///
    /// Fails on an empty list or on a pattern that is not a valid regular
    /// expression after expansion.
    pub fn compile<I, S>(raw: I, mode: MatchMode, flags: MatchFlags) -> PatternResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = raw
            .into_iter()
            .map(|p| {
                let expanded = mode.expand(p.as_ref());
                flags
                    .builder(&expanded)
                    .build()
                    .map_err(|source| PatternError::Invalid {
                        pattern: expanded,
                        source,
                    })
            })
            .collect::<PatternResult<Vec<_>>>()?;

        if patterns.is_empty() {
            return Err(PatternError::Empty);
        }

        Ok(Self {
            mode,
            flags,
            patterns,
        })
    }

    /// Returns `true` if any pattern matches `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// Returns the match mode the set was compiled with.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns the regex options.
    pub fn flags(&self) -> MatchFlags {
        self.flags
    }

    /// Returns the expanded pattern sources in declaration order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// Returns the number of patterns. Never zero.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl PartialEq for PatternSet {
    fn eq(&self, other: &Self) -> bool {
        self.flags == other.flags && self.sources().eq(other.sources())
    }
}

impl Eq for PatternSet {}

impl fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSet")
            .field("mode", &self.mode)
            .field("flags", &self.flags)
            .field("patterns", &self.sources().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_full_mode_requires_whole_text() {
        let set = assert_ok!(PatternSet::compile(["ping"], MatchMode::Full, MatchFlags::NONE));
        assert!(set.is_match("ping"));
        assert!(!set.is_match("ping pong"));
        assert!(!set.is_match("a ping"));
    }

    #[test]
    fn test_full_mode_anchors_alternations() {
        let set = PatternSet::compile(["a|b"], MatchMode::Full, MatchFlags::NONE).unwrap();
        assert!(set.is_match("a"));
        assert!(set.is_match("b"));
        assert!(!set.is_match("ab"));
        assert!(!set.is_match("xb"));
    }

    #[test]
    fn test_regex_mode_is_verbatim() {
        let set = PatternSet::compile([r"^/echo\s+"], MatchMode::Regex, MatchFlags::NONE).unwrap();
        assert!(set.is_match("/echo hello"));
        assert!(!set.is_match("say /echo hello"));
        assert_eq!(set.sources().collect::<Vec<_>>(), vec![r"^/echo\s+"]);
    }

    #[test]
    fn test_keyword_mode_matches_any_listed_character() {
        let set = PatternSet::compile(["ab"], MatchMode::Keyword, MatchFlags::NONE).unwrap();

        assert_eq!(set.sources().collect::<Vec<_>>(), vec!["[ab]+"]);
        assert!(set.is_match("ba"));
        assert!(set.is_match("a"));
        // "b" alone does not contain the substring "ab" but still matches.
        assert!(set.is_match("b"));
        assert!(set.is_match("xxbxx"));
        assert!(!set.is_match("xyz"));
    }

    #[test]
    fn test_any_pattern_matches() {
        let set =
            PatternSet::compile(["help", "帮助"], MatchMode::Full, MatchFlags::NONE).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.is_match("帮助"));
        assert!(set.is_match("help"));
        assert!(!set.is_match("helper"));
    }

    #[test]
    fn test_case_insensitive_flag() {
        let strict = PatternSet::compile(["ping"], MatchMode::Full, MatchFlags::NONE).unwrap();
        let loose =
            PatternSet::compile(["ping"], MatchMode::Full, MatchFlags::IGNORE_CASE).unwrap();
        assert!(!strict.is_match("PING"));
        assert!(loose.is_match("PING"));
    }

    #[test]
    fn test_empty_list_is_rejected() {
        let err = assert_err!(PatternSet::compile(
            Vec::<String>::new(),
            MatchMode::Full,
            MatchFlags::NONE
        ));
        assert!(matches!(err, PatternError::Empty));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let err = PatternSet::compile(["("], MatchMode::Regex, MatchFlags::NONE).unwrap_err();
        assert!(matches!(err, PatternError::Invalid { pattern, .. } if pattern == "("));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Keyword".parse::<MatchMode>().unwrap(), MatchMode::Keyword);
        assert_eq!("full".parse::<MatchMode>().unwrap(), MatchMode::Full);
        let err = "fuzzy".parse::<MatchMode>().unwrap_err();
        assert!(matches!(err, PatternError::UnknownMode(m) if m == "fuzzy"));
    }

    #[test]
    fn test_structural_equality() {
        let a = PatternSet::compile(["x"], MatchMode::Full, MatchFlags::NONE).unwrap();
        let b = PatternSet::compile(["x"], MatchMode::Full, MatchFlags::NONE).unwrap();
        let c = PatternSet::compile(["x"], MatchMode::Regex, MatchFlags::NONE).unwrap();
        let d = PatternSet::compile(["x"], MatchMode::Full, MatchFlags::IGNORE_CASE).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
