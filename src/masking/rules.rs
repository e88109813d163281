//! Masking rule catalog
//!
//! Rules are declared as [`RuleDefinition`] entries (from a rules file or
//! inline `[[masking.rules]]` config) and parsed once into [`MaskingRule`]
//! values. A [`RuleSet`] is immutable after load and resolves the single best
//! rule for a concrete field path.

use crate::domain::document::FieldPath;
use crate::domain::{PhimaskError, Result};
use crate::masking::engine::DATE_WRAPPER_KEY;
use crate::masking::matcher::{best_match, FieldPattern};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Default alphabet for shape-preserving name masking
pub const DEFAULT_NAME_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default replacement for fixed-text rules
pub const DEFAULT_FIXED_TEXT: &str = "xxxxxx";

/// Default date-shift offset: 37 days in milliseconds
pub const DEFAULT_DATE_SHIFT_OFFSET_MS: i64 = 37 * 24 * 60 * 60 * 1000;

/// Rule as declared in configuration
///
/// Any keys besides `field`, `type` and `description` are rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Dotted field pattern
    pub field: String,

    /// Rule type name (`shape_preserving_name`, `email_mask`, ...)
    #[serde(rename = "type")]
    pub rule_type: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Rule parameters
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl RuleDefinition {
    /// Creates a definition without parameters
    pub fn new(field: impl Into<String>, rule_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule_type: rule_type.into(),
            description: None,
            params: Map::new(),
        }
    }

    /// Adds a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Parsed transformation of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// Replace each non-space character with a random letter from the alphabet
    ShapePreservingName {
        /// Replacement alphabet
        alphabet: Vec<char>,
    },
    /// Replace with a constant text
    FixedText {
        /// Replacement text
        text: String,
    },
    /// Replace with a random integer in `[1_000_000_000, 9_999_999_999]`
    RandomTenDigit,
    /// Replace with the email sentinel
    EmailMask,
    /// Replace with the gender sentinel
    GenderMask,
    /// Replace with the path sentinel
    PathMask,
    /// Shift temporal values by a fixed number of milliseconds
    DateShift {
        /// Offset applied to every value
        offset_ms: i64,
    },
}

impl RuleKind {
    /// Canonical type name
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::ShapePreservingName { .. } => "shape_preserving_name",
            RuleKind::FixedText { .. } => "fixed_text",
            RuleKind::RandomTenDigit => "random_10_digit",
            RuleKind::EmailMask => "email_mask",
            RuleKind::GenderMask => "gender_mask",
            RuleKind::PathMask => "path_mask",
            RuleKind::DateShift { .. } => "date_shift",
        }
    }

    /// Whether the rule always yields the same sentinel regardless of input
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            RuleKind::FixedText { .. }
                | RuleKind::EmailMask
                | RuleKind::GenderMask
                | RuleKind::PathMask
        )
    }

    fn parse(rule_type: &str, params: &Map<String, Value>) -> std::result::Result<Self, String> {
        let normalized = rule_type.trim().to_ascii_lowercase().replace('-', "_");
        let (kind, allowed): (RuleKind, &[&str]) = match normalized.as_str() {
            "shape_preserving_name" | "name" => {
                let alphabet = match params.get("alphabet") {
                    None => DEFAULT_NAME_ALPHABET.chars().collect(),
                    Some(Value::String(s)) if !s.is_empty() => s.chars().collect(),
                    Some(_) => return Err("'alphabet' must be a non-empty string".to_string()),
                };
                (RuleKind::ShapePreservingName { alphabet }, &["alphabet"])
            }
            "fixed_text" | "text" => {
                let text = match params.get("text") {
                    None => DEFAULT_FIXED_TEXT.to_string(),
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => return Err("'text' must be a string".to_string()),
                };
                (RuleKind::FixedText { text }, &["text"])
            }
            "random_10_digit" | "digits" => (RuleKind::RandomTenDigit, &[]),
            "email_mask" | "email" => (RuleKind::EmailMask, &[]),
            "gender_mask" | "gender" => (RuleKind::GenderMask, &[]),
            "path_mask" | "path" => (RuleKind::PathMask, &[]),
            "date_shift" | "date" => {
                let raw = match (params.get("offset_ms"), params.get("offset")) {
                    (Some(_), Some(_)) => {
                        return Err("only one of 'offset_ms' or 'offset' may be set".to_string())
                    }
                    (Some(v), None) | (None, Some(v)) => Some(v),
                    (None, None) => None,
                };
                let offset_ms = match raw {
                    None => DEFAULT_DATE_SHIFT_OFFSET_MS,
                    Some(v) => v
                        .as_i64()
                        .ok_or_else(|| "'offset_ms' must be an integer".to_string())?,
                };
                (RuleKind::DateShift { offset_ms }, &["offset_ms", "offset"])
            }
            other => {
                return Err(format!(
                    "Invalid rule type '{other}'. Must be one of: shape_preserving_name, \
                     fixed_text, random_10_digit, email_mask, gender_mask, path_mask, date_shift"
                ))
            }
        };

        if let Some(unknown) = params.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(format!(
                "unknown parameter '{unknown}' for rule type '{}'",
                kind.name()
            ));
        }
        Ok(kind)
    }
}

/// A single immutable masking rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskingRule {
    pattern: FieldPattern,
    kind: RuleKind,
    description: Option<String>,
}

impl MaskingRule {
    /// Parses a rule definition
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::Configuration` for an invalid pattern, an unknown
    /// rule type or bad parameters.
    pub fn from_definition(definition: &RuleDefinition) -> Result<Self> {
        let pattern = FieldPattern::parse(&definition.field).map_err(|e| {
            PhimaskError::Configuration(format!("Invalid rule field '{}': {e}", definition.field))
        })?;
        if pattern.as_str().split('.').any(|part| part == DATE_WRAPPER_KEY) {
            return Err(PhimaskError::Configuration(format!(
                "Invalid rule field '{}': date wrappers are leaves, target the field that holds them",
                definition.field
            )));
        }
        let kind = RuleKind::parse(&definition.rule_type, &definition.params).map_err(|e| {
            PhimaskError::Configuration(format!("Invalid rule for '{}': {e}", definition.field))
        })?;
        Ok(Self {
            pattern,
            kind,
            description: definition.description.clone(),
        })
    }

    /// Builds a rule directly from its parts
    pub fn new(pattern: FieldPattern, kind: RuleKind) -> Self {
        Self {
            pattern,
            kind,
            description: None,
        }
    }

    /// Field pattern
    pub fn pattern(&self) -> &FieldPattern {
        &self.pattern
    }

    /// Transformation
    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    /// Description, if declared
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<RuleDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRulesFile {
    List(Vec<RuleDefinition>),
    Table(RulesFile),
}

/// Ordered, immutable collection of masking rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<MaskingRule>,
    by_length: HashMap<usize, Vec<usize>>,
}

impl RuleSet {
    /// Builds a rule set from parsed rules, keeping declaration order
    pub fn new(rules: Vec<MaskingRule>) -> Self {
        let mut by_length: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            by_length.entry(rule.pattern.len()).or_default().push(i);
        }
        Self { rules, by_length }
    }

    /// Parses every definition
    ///
    /// # Errors
    ///
    /// Returns the first `PhimaskError::Configuration` encountered.
    pub fn from_definitions(definitions: &[RuleDefinition]) -> Result<Self> {
        let mut rules = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let rule = MaskingRule::from_definition(definition)?;
            if rules
                .iter()
                .any(|r: &MaskingRule| r.pattern == rule.pattern)
            {
                tracing::warn!(
                    field = %rule.pattern,
                    "Duplicate rule pattern; the first declaration wins"
                );
            }
            rules.push(rule);
        }
        Ok(Self::new(rules))
    }

    /// Reads rule definitions from a TOML or JSON file
    ///
    /// TOML files use `[[rules]]` tables. JSON files hold either an array of
    /// rules or an object with a `rules` array. The format is chosen by the
    /// `.json` extension; anything else is read as TOML.
    pub fn load_file(path: &Path) -> Result<Vec<RuleDefinition>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PhimaskError::Configuration(format!(
                "Failed to read rules file {}: {e}",
                path.display()
            ))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let parsed: JsonRulesFile = serde_json::from_str(&content).map_err(|e| {
                PhimaskError::Configuration(format!(
                    "Failed to parse rules file {}: {e}",
                    path.display()
                ))
            })?;
            Ok(match parsed {
                JsonRulesFile::List(rules) => rules,
                JsonRulesFile::Table(file) => file.rules,
            })
        } else {
            let parsed: RulesFile = toml::from_str(&content)?;
            Ok(parsed.rules)
        }
    }

    /// Loads the rules file (if any) followed by inline definitions
    pub fn load(rules_file: Option<&Path>, inline: &[RuleDefinition]) -> Result<Self> {
        let mut definitions = match rules_file {
            Some(path) => Self::load_file(path)?,
            None => Vec::new(),
        };
        definitions.extend(inline.iter().cloned());
        let set = Self::from_definitions(&definitions)?;
        tracing::debug!(rules = set.len(), "Loaded masking rule set");
        Ok(set)
    }

    /// Returns the best rule for a concrete path
    pub fn resolve(&self, path: &FieldPath) -> Option<&MaskingRule> {
        let candidates = self.by_length.get(&path.len())?;
        best_match(
            candidates.iter().map(|&i| (&self.rules[i].pattern, &self.rules[i])),
            path,
        )
    }

    /// Rules in declaration order
    pub fn rules(&self) -> &[MaskingRule] {
        &self.rules
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::Builder;
    use test_case::test_case;

    fn path(keys: &[&str]) -> FieldPath {
        keys.iter().copied().collect()
    }

    fn rule(field: &str, rule_type: &str) -> MaskingRule {
        MaskingRule::from_definition(&RuleDefinition::new(field, rule_type)).unwrap()
    }

    #[test_case("shape_preserving_name", "shape_preserving_name" ; "canonical name")]
    #[test_case("shape-preserving-name", "shape_preserving_name" ; "dashed name")]
    #[test_case("NAME", "shape_preserving_name" ; "alias uppercase")]
    #[test_case("fixed_text", "fixed_text" ; "fixed text")]
    #[test_case("random-10-digit", "random_10_digit" ; "random digits")]
    #[test_case("email", "email_mask" ; "email alias")]
    #[test_case("gender_mask", "gender_mask" ; "gender")]
    #[test_case("path", "path_mask" ; "path alias")]
    #[test_case("date-shift", "date_shift" ; "date shift")]
    fn test_rule_type_aliases(rule_type: &str, expected: &str) {
        assert_eq!(rule("Field", rule_type).kind().name(), expected);
    }

    #[test]
    fn test_unknown_rule_type_is_configuration_error() {
        let err = MaskingRule::from_definition(&RuleDefinition::new("Field", "scramble"))
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("scramble"));
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let err =
            MaskingRule::from_definition(&RuleDefinition::new("a..b", "email")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test_case("Dob.$date" ; "wrapper key")]
    #[test_case("Visits.*.Date.$date" ; "wrapper under wildcard")]
    #[test_case("Dob.$date.$numberLong" ; "below wrapper")]
    fn test_date_wrapper_path_rejected(field: &str) {
        let err = MaskingRule::from_definition(&RuleDefinition::new(field, "date_shift"))
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains(field));
    }

    #[test]
    fn test_unknown_param_rejected() {
        let def = RuleDefinition::new("Email", "email_mask").with_param("text", json!("x"));
        assert!(MaskingRule::from_definition(&def).is_err());
    }

    #[test]
    fn test_rule_params() {
        let def = RuleDefinition::new("Name", "name").with_param("alphabet", json!("ab"));
        assert_eq!(
            MaskingRule::from_definition(&def).unwrap().kind(),
            &RuleKind::ShapePreservingName {
                alphabet: vec!['a', 'b']
            }
        );

        let def = RuleDefinition::new("Note", "fixed_text").with_param("text", json!("REDACTED"));
        assert_eq!(
            MaskingRule::from_definition(&def).unwrap().kind(),
            &RuleKind::FixedText {
                text: "REDACTED".to_string()
            }
        );

        let def = RuleDefinition::new("Dob", "date_shift").with_param("offset", json!(-1000));
        assert_eq!(
            MaskingRule::from_definition(&def).unwrap().kind(),
            &RuleKind::DateShift { offset_ms: -1000 }
        );

        assert_eq!(
            rule("Dob", "date_shift").kind(),
            &RuleKind::DateShift {
                offset_ms: DEFAULT_DATE_SHIFT_OFFSET_MS
            }
        );
        assert_eq!(
            rule("Note", "fixed_text").kind(),
            &RuleKind::FixedText {
                text: DEFAULT_FIXED_TEXT.to_string()
            }
        );
    }

    #[test]
    fn test_bad_param_types_rejected() {
        let bad = [
            RuleDefinition::new("Name", "name").with_param("alphabet", json!("")),
            RuleDefinition::new("Note", "text").with_param("text", json!(5)),
            RuleDefinition::new("Dob", "date").with_param("offset_ms", json!("soon")),
            RuleDefinition::new("Dob", "date")
                .with_param("offset_ms", json!(1))
                .with_param("offset", json!(2)),
        ];
        for def in &bad {
            assert!(MaskingRule::from_definition(def).is_err(), "{def:?}");
        }
    }

    #[test]
    fn test_constant_kinds() {
        assert!(rule("a", "email").kind().is_constant());
        assert!(rule("a", "fixed_text").kind().is_constant());
        assert!(!rule("a", "name").kind().is_constant());
        assert!(!rule("a", "date_shift").kind().is_constant());
        assert!(!rule("a", "random_10_digit").kind().is_constant());
    }

    #[test]
    fn test_empty_rule_set_matches_nothing() {
        let set = RuleSet::default();
        assert!(set.resolve(&path(&["FirstName"])).is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_resolve_specificity_and_order() {
        let set = RuleSet::new(vec![
            rule("*.Email", "fixed_text"),
            rule("Contact.*", "gender_mask"),
            rule("Contact.Email", "email_mask"),
            rule("FirstName", "name"),
        ]);

        let chosen = set.resolve(&path(&["Contact", "Email"])).unwrap();
        assert_eq!(chosen.kind(), &RuleKind::EmailMask);

        let chosen = set.resolve(&path(&["Other", "Email"])).unwrap();
        assert_eq!(chosen.pattern().as_str(), "*.Email");

        assert!(set.resolve(&path(&["Contact"])).is_none());
        assert!(set.resolve(&path(&["LastName"])).is_none());
    }

    #[test]
    fn test_load_toml_rules_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[rules]]
field = "FirstName"
type = "shape_preserving_name"
description = "Given name"

[[rules]]
field = "Dob"
type = "date_shift"
offset_ms = 86400000
"#
        )
        .unwrap();

        let defs = RuleSet::load_file(file.path()).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].description.as_deref(), Some("Given name"));
        assert_eq!(defs[1].params.get("offset_ms"), Some(&json!(86400000)));
    }

    #[test]
    fn test_load_json_rules_file_both_shapes() {
        let mut list = Builder::new().suffix(".json").tempfile().unwrap();
        write!(list, r#"[{{"field": "Email", "type": "email"}}]"#).unwrap();
        assert_eq!(RuleSet::load_file(list.path()).unwrap().len(), 1);

        let mut table = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            table,
            r#"{{"rules": [{{"field": "Email", "type": "email"}}, {{"field": "Sex", "type": "gender"}}]}}"#
        )
        .unwrap();
        assert_eq!(RuleSet::load_file(table.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_load_file_then_inline_order() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"field": "*", "type": "fixed_text"}}]"#).unwrap();
        let inline = vec![RuleDefinition::new("Note", "gender_mask")];

        let set = RuleSet::load(Some(file.path()), &inline).unwrap();
        assert_eq!(set.len(), 2);
        // Same specificity would favour the file rule, but the literal wins
        assert_eq!(
            set.resolve(&path(&["Note"])).unwrap().kind(),
            &RuleKind::GenderMask
        );
        assert_eq!(set.rules()[0].pattern().as_str(), "*");
    }

    #[test]
    fn test_missing_rules_file_is_configuration_error() {
        let err = RuleSet::load_file(Path::new("/nonexistent/rules.toml")).unwrap_err();
        assert!(err.is_configuration());
    }
}
