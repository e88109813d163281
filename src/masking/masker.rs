//! Recursive document masker

use crate::domain::document::{Document, FieldPath, ID_FIELD, MASK_MARKER_FIELD};
use crate::domain::{PhimaskError, Result};
use crate::masking::engine::{is_date_wrapper, transform_checked, RuleEngine};
use crate::masking::rules::RuleSet;
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Maximum nesting depth accepted before a document is rejected
pub const MAX_DEPTH: usize = 256;

/// Result of masking one document
#[derive(Debug, Clone, PartialEq)]
pub struct MaskOutcome {
    /// Masked copy
    pub document: Document,
    /// Number of fields a rule replaced
    pub masked_fields: usize,
    /// Replacements per rule pattern
    pub rule_hits: BTreeMap<String, usize>,
}

/// Produces structurally isomorphic masked copies of documents
#[derive(Debug, Clone)]
pub struct DocumentMasker {
    engine: RuleEngine,
}

struct Walk<'a, R: Rng + ?Sized> {
    engine: &'a RuleEngine,
    rng: &'a mut R,
    id: String,
    masked_fields: usize,
    rule_hits: BTreeMap<String, usize>,
}

impl DocumentMasker {
    /// Creates a masker over an engine
    pub fn new(engine: RuleEngine) -> Self {
        Self { engine }
    }

    /// Creates a masker straight from a rule set
    pub fn from_rules(rules: RuleSet) -> Self {
        Self::new(RuleEngine::new(rules))
    }

    /// Returns the engine
    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Masks a document with the thread-local generator
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::MalformedDocument` if the document nests deeper
    /// than [`MAX_DEPTH`].
    pub fn mask(&self, document: &Document) -> Result<MaskOutcome> {
        self.mask_with_rng(document, &mut rand::thread_rng())
    }

    /// Masks a raw JSON value, validating its shape first
    pub fn mask_value(&self, value: Value) -> Result<MaskOutcome> {
        let document = Document::from_value(value)?;
        self.mask(&document)
    }

    /// Masks a document with an explicit random source
    pub fn mask_with_rng<R: Rng + ?Sized>(
        &self,
        document: &Document,
        rng: &mut R,
    ) -> Result<MaskOutcome> {
        let mut walk = Walk {
            engine: &self.engine,
            rng,
            id: document.id().to_string(),
            masked_fields: 0,
            rule_hits: BTreeMap::new(),
        };

        let mut body = Map::new();
        let mut path = FieldPath::new();
        for (key, value) in document.body() {
            // Identifier and marker are never rewritten
            if key == ID_FIELD || key == MASK_MARKER_FIELD {
                body.insert(key.clone(), value.clone());
                continue;
            }
            path.push_key(key.as_str());
            let masked = walk.visit(value, &mut path, 1)?;
            path.pop();
            body.insert(key.clone(), masked);
        }

        Ok(MaskOutcome {
            document: Document::from_map(body)?,
            masked_fields: walk.masked_fields,
            rule_hits: walk.rule_hits,
        })
    }
}

impl<R: Rng + ?Sized> Walk<'_, R> {
    fn visit(&mut self, value: &Value, path: &mut FieldPath, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(PhimaskError::malformed(
                Some(self.id.clone()),
                format!("nesting exceeds {MAX_DEPTH} levels"),
            ));
        }

        let recursed = match value {
            Value::Object(map) if !is_date_wrapper(value) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    path.push_key(key.as_str());
                    let masked = self.visit(child, path, depth + 1)?;
                    path.pop();
                    out.insert(key.clone(), masked);
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    path.push_index(i);
                    out.push(self.visit(child, path, depth + 1)?);
                    path.pop();
                }
                Value::Array(out)
            }
            leaf => return Ok(self.apply(leaf, path, false)),
        };

        Ok(self.apply(&recursed, path, true))
    }

    fn apply(&mut self, value: &Value, path: &FieldPath, container: bool) -> Value {
        let Some(rule) = self.engine.resolve(path) else {
            return value.clone();
        };
        // Containers are only replaced by sentinel rules
        if container && !rule.kind().is_constant() {
            return value.clone();
        }
        match transform_checked(value, rule.kind(), &mut *self.rng) {
            Some(masked) => {
                self.masked_fields += 1;
                *self
                    .rule_hits
                    .entry(rule.pattern().as_str().to_string())
                    .or_insert(0) += 1;
                masked
            }
            None => value.clone(),
        }
    }
}
