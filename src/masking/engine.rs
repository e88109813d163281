//! Rule engine
//!
//! Resolves rules for concrete paths and applies their transformations to
//! JSON values. Transformations never fail: a value the rule cannot handle is
//! returned unchanged.

use crate::domain::document::FieldPath;
use crate::masking::rules::{MaskingRule, RuleKind, RuleSet};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat};
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Replacement for email fields
pub const EMAIL_SENTINEL: &str = "xxxxxx@xxxx.com";

/// Replacement for gender fields
pub const GENDER_SENTINEL: &str = "xxxxxx";

/// Replacement for file-system path fields
pub const PATH_SENTINEL: &str = "/xxxxxx/xxxxxx";

/// Smallest value produced by the random ten digit rule
pub const RANDOM_TEN_DIGIT_MIN: i64 = 1_000_000_000;

/// Largest value produced by the random ten digit rule
pub const RANDOM_TEN_DIGIT_MAX: i64 = 9_999_999_999;

/// Key of an extended-JSON date wrapper
pub const DATE_WRAPPER_KEY: &str = "$date";

const NUMBER_LONG_KEY: &str = "$numberLong";
const PLAIN_DATE_FORMAT: &str = "%Y-%m-%d";
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Shared, read-only engine over one rule set
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Arc<RuleSet>,
}

impl RuleEngine {
    /// Creates an engine over the given rule set
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Returns the underlying rule set
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Returns the best rule for a path, if any
    pub fn resolve(&self, path: &FieldPath) -> Option<&MaskingRule> {
        self.rules.resolve(path)
    }

    /// Applies a rule using the thread-local generator
    pub fn transform(&self, value: &Value, rule: &MaskingRule) -> Value {
        transform_with_rng(value, rule.kind(), &mut rand::thread_rng())
    }
}

/// Applies a rule kind, returning the input unchanged if it is incompatible
pub fn transform_with_rng<R: Rng + ?Sized>(value: &Value, kind: &RuleKind, rng: &mut R) -> Value {
    transform_checked(value, kind, rng).unwrap_or_else(|| value.clone())
}

/// Applies a rule kind
///
/// Returns `None` when the value's type or content is incompatible with the
/// rule (for example a number under a name rule, or a date shift that would
/// overflow). Callers treat `None` as "leave the value as is".
pub fn transform_checked<R: Rng + ?Sized>(
    value: &Value,
    kind: &RuleKind,
    rng: &mut R,
) -> Option<Value> {
    match kind {
        RuleKind::ShapePreservingName { alphabet } => match value {
            Value::String(s) => Some(Value::String(shape_preserving(s, alphabet, rng))),
            Value::Null => Some(Value::String(String::new())),
            _ => None,
        },
        RuleKind::FixedText { text } => Some(Value::String(text.clone())),
        RuleKind::EmailMask => Some(Value::String(EMAIL_SENTINEL.to_string())),
        RuleKind::GenderMask => Some(Value::String(GENDER_SENTINEL.to_string())),
        RuleKind::PathMask => Some(Value::String(PATH_SENTINEL.to_string())),
        RuleKind::RandomTenDigit => Some(Value::from(
            rng.gen_range(RANDOM_TEN_DIGIT_MIN..=RANDOM_TEN_DIGIT_MAX),
        )),
        RuleKind::DateShift { offset_ms } => shift_temporal(value, *offset_ms),
    }
}

/// Whether a value is an extended-JSON date wrapper (`{"$date": ...}`)
pub fn is_date_wrapper(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.contains_key(DATE_WRAPPER_KEY),
        _ => false,
    }
}

fn shape_preserving<R: Rng + ?Sized>(input: &str, alphabet: &[char], rng: &mut R) -> String {
    input
        .chars()
        .map(|c| {
            if c == ' ' || alphabet.is_empty() {
                c
            } else {
                alphabet[rng.gen_range(0..alphabet.len())]
            }
        })
        .collect()
}

fn shift_temporal(value: &Value, offset_ms: i64) -> Option<Value> {
    match value {
        Value::Number(_) => shift_epoch_millis(value, offset_ms),
        Value::String(s) => shift_date_string(s, offset_ms).map(Value::String),
        Value::Object(map) if is_date_wrapper(value) => {
            let inner = map.get(DATE_WRAPPER_KEY)?;
            let shifted = match inner {
                Value::Number(_) => shift_epoch_millis(inner, offset_ms)?,
                Value::String(s) => Value::String(shift_date_string(s, offset_ms)?),
                Value::Object(long) if long.len() == 1 => {
                    let millis = long.get(NUMBER_LONG_KEY)?.as_str()?.parse::<i64>().ok()?;
                    let mut wrapped = Map::new();
                    wrapped.insert(
                        NUMBER_LONG_KEY.to_string(),
                        Value::String(millis.checked_add(offset_ms)?.to_string()),
                    );
                    Value::Object(wrapped)
                }
                _ => return None,
            };
            let mut out = Map::new();
            out.insert(DATE_WRAPPER_KEY.to_string(), shifted);
            Some(Value::Object(out))
        }
        _ => None,
    }
}

fn shift_epoch_millis(value: &Value, offset_ms: i64) -> Option<Value> {
    value.as_i64()?.checked_add(offset_ms).map(Value::from)
}

fn shift_date_string(s: &str, offset_ms: i64) -> Option<String> {
    let offset = Duration::try_milliseconds(offset_ms)?;

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        let use_z = s.ends_with('Z') || s.ends_with('z');
        let shifted = timestamp.checked_add_signed(offset)?;
        return Some(shifted.to_rfc3339_opts(SecondsFormat::AutoSi, use_z));
    }

    // A bare date cannot carry a sub-day shift
    if offset_ms % MILLIS_PER_DAY != 0 {
        return None;
    }
    let date = NaiveDate::parse_from_str(s, PLAIN_DATE_FORMAT).ok()?;
    let shifted = date.and_hms_opt(0, 0, 0)?.checked_add_signed(offset)?;
    Some(shifted.date().format(PLAIN_DATE_FORMAT).to_string())
}
