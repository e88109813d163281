//! Field path patterns
//!
//! A pattern is a dotted template such as `Patients.*.FirstName`. Each
//! segment is either a literal (matching one object key, or the array index
//! with the same decimal value) or `*` (matching any single segment).
//! Patterns only match paths with exactly as many segments.

use crate::domain::document::{FieldPath, PathSegment};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wildcard segment marker
pub const WILDCARD: &str = "*";

/// One segment of a [`FieldPattern`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    /// Matches one key, or the array index whose canonical decimal form equals the text
    Literal {
        /// Segment text
        text: String,
        /// Array index this literal also matches, if it is a canonical integer
        index: Option<usize>,
    },
    /// Matches exactly one segment of any kind
    Wildcard,
}

impl PatternSegment {
    fn parse(text: &str) -> Self {
        if text == WILDCARD {
            return PatternSegment::Wildcard;
        }
        let index = text
            .parse::<usize>()
            .ok()
            .filter(|n| n.to_string() == text);
        PatternSegment::Literal {
            text: text.to_string(),
            index,
        }
    }

    fn matches(&self, segment: &PathSegment) -> bool {
        match (self, segment) {
            (PatternSegment::Wildcard, _) => true,
            (PatternSegment::Literal { text, .. }, PathSegment::Key(key)) => text == key,
            (PatternSegment::Literal { index, .. }, PathSegment::Index(i)) => *index == Some(*i),
        }
    }
}

/// Parsed dotted field-path pattern
///
/// # Examples
///
/// ```
/// use phimask::masking::matcher::FieldPattern;
/// use phimask::domain::document::FieldPath;
///
/// let pattern: FieldPattern = "Contacts.*.Email".parse().unwrap();
/// let mut path = FieldPath::new();
/// path.push_key("Contacts");
/// path.push_index(3);
/// path.push_key("Email");
///
/// assert!(pattern.matches(&path));
/// assert_eq!(pattern.specificity(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

impl FieldPattern {
    /// Parses a dotted pattern
    ///
    /// # Arguments
    ///
    /// * `raw` - Dotted pattern text
    ///
    /// # Returns
    ///
    /// Returns `Err` if the pattern is empty or has an empty segment
    /// (leading, trailing or doubled dots).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("field pattern cannot be empty".to_string());
        }
        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            if part.is_empty() {
                return Err(format!("field pattern '{trimmed}' has an empty segment"));
            }
            segments.push(PatternSegment::parse(part));
        }
        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// Returns the pattern text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; parsed patterns have at least one segment
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of literal segments
    pub fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PatternSegment::Literal { .. }))
            .count()
    }

    /// Whether the pattern contains no wildcards
    pub fn is_literal(&self) -> bool {
        self.specificity() == self.len()
    }

    /// Whether this pattern matches the concrete path
    pub fn matches(&self, path: &FieldPath) -> bool {
        self.segments.len() == path.len()
            && self
                .segments
                .iter()
                .zip(path.segments())
                .all(|(pattern, segment)| pattern.matches(segment))
    }
}

/// Picks the best pattern for a path
///
/// Candidates are visited in declaration order. The highest specificity
/// wins; among equal specificity the earliest candidate wins.
pub fn best_match<'a, T, I>(candidates: I, path: &FieldPath) -> Option<T>
where
    I: IntoIterator<Item = (&'a FieldPattern, T)>,
{
    let mut best: Option<(usize, T)> = None;
    for (pattern, item) in candidates {
        if !pattern.matches(path) {
            continue;
        }
        let specificity = pattern.specificity();
        match &best {
            Some((current, _)) if *current >= specificity => {}
            _ => best = Some((specificity, item)),
        }
    }
    best.map(|(_, item)| item)
}

impl fmt::Display for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for FieldPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FieldPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        FieldPattern::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn path(segments: &[&str]) -> FieldPath {
        let mut path = FieldPath::new();
        for s in segments {
            match s.strip_prefix('#') {
                Some(index) => path.push_index(index.parse().unwrap()),
                None => path.push_key(*s),
            }
        }
        path
    }

    #[test_case("FirstName", &["FirstName"], true ; "literal top level")]
    #[test_case("FirstName", &["LastName"], false ; "different key")]
    #[test_case("*", &["Anything"], true ; "wildcard key")]
    #[test_case("Contact.Email", &["Contact"], false ; "pattern longer than path")]
    #[test_case("Contact", &["Contact", "Email"], false ; "no prefix match")]
    #[test_case("Phones.*", &["Phones", "#2"], true ; "wildcard index")]
    #[test_case("Phones.0", &["Phones", "#0"], true ; "literal index")]
    #[test_case("Phones.0", &["Phones", "#1"], false ; "other index")]
    #[test_case("Phones.00", &["Phones", "#0"], false ; "non canonical index")]
    #[test_case("Phones.0", &["Phones", "0"], true ; "numeric object key")]
    #[test_case("*.*.City", &["Patient", "Address", "City"], true ; "two wildcards")]
    fn test_pattern_matches(pattern: &str, segments: &[&str], expected: bool) {
        let pattern = FieldPattern::parse(pattern).unwrap();
        assert_eq!(pattern.matches(&path(segments)), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case(".Name" ; "leading dot")]
    #[test_case("Name." ; "trailing dot")]
    #[test_case("a..b" ; "double dot")]
    fn test_pattern_rejects(raw: &str) {
        assert!(FieldPattern::parse(raw).is_err());
    }

    #[test]
    fn test_specificity() {
        assert_eq!(FieldPattern::parse("a.b.c").unwrap().specificity(), 3);
        assert_eq!(FieldPattern::parse("a.*.c").unwrap().specificity(), 2);
        assert_eq!(FieldPattern::parse("*.*").unwrap().specificity(), 0);
        assert!(FieldPattern::parse("a.b").unwrap().is_literal());
        assert!(!FieldPattern::parse("a.*").unwrap().is_literal());
    }

    #[test]
    fn test_best_match_prefers_literal() {
        let wildcard = FieldPattern::parse("Contact.*").unwrap();
        let literal = FieldPattern::parse("Contact.Email").unwrap();
        let candidates = vec![(&wildcard, "wildcard"), (&literal, "literal")];

        let chosen = best_match(candidates, &path(&["Contact", "Email"]));
        assert_eq!(chosen, Some("literal"));
    }

    #[test]
    fn test_best_match_first_declared_on_tie() {
        let first = FieldPattern::parse("*.Email").unwrap();
        let second = FieldPattern::parse("Contact.*").unwrap();
        let candidates = vec![(&first, 1), (&second, 2)];

        assert_eq!(best_match(candidates, &path(&["Contact", "Email"])), Some(1));
    }

    #[test]
    fn test_best_match_empty_candidates() {
        let candidates: Vec<(&FieldPattern, u8)> = Vec::new();
        assert_eq!(best_match(candidates, &path(&["Anything"])), None);
    }

    #[test]
    fn test_pattern_serde() {
        let pattern: FieldPattern = serde_json::from_str("\"a.*.b\"").unwrap();
        assert_eq!(pattern.as_str(), "a.*.b");
        assert!(serde_json::from_str::<FieldPattern>("\"a..b\"").is_err());
    }
}
