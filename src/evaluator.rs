use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{RuleDefinition, Rulepack};
use crate::error::{GovernorError, Result};

/// A rule definition with its pattern compiled for repeated matching.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub description: String,
    pub allow: bool,
    pattern: Regex,
}

/// The verdict produced by rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
}

/// Evaluates decision payloads against compiled rulepacks.
///
/// Compiled rule lists are kept per rulepack id and replaced wholesale on
/// preload; a batch that fails to compile leaves the previous list untouched.
pub struct RuleEvaluator {
    rules: RwLock<HashMap<String, Arc<Vec<CompiledRule>>>>,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        RuleEvaluator {
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Compile all definitions for a rulepack and atomically replace its rule
    /// list. The first pattern that fails to compile aborts the whole batch
    /// with a `Compile` error naming the offending rule id.
    pub fn preload(&self, rulepack_id: &str, definitions: &[RuleDefinition]) -> Result<()> {
        let mut compiled = Vec::with_capacity(definitions.len());
        for def in definitions {
            let pattern = Regex::new(&def.pattern).map_err(|e| GovernorError::Compile {
                rule_id: def.id.clone(),
                source: e,
            })?;
            compiled.push(CompiledRule {
                id: def.id.clone(),
                description: def.description.clone(),
                allow: def.allow,
                pattern,
            });
        }

        debug!(rulepack_id, rules = compiled.len(), "rulepack compiled");
        self.rules
            .write()
            .insert(rulepack_id.to_string(), Arc::new(compiled));
        Ok(())
    }

    /// Number of rulepacks with a compiled rule list.
    pub fn loaded_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Evaluate a payload against a rulepack.
    ///
    /// Rules are checked strictly in definition order and the first matching
    /// rule decides the verdict. A rule matches when the payload carries a
    /// string field named after the rule id and the rule's pattern matches
    /// that string; non-string fields are ignored. When no rule matches the
    /// verdict is the default deny.
    pub fn evaluate(
        &self,
        cancel: &CancellationToken,
        pack: &Rulepack,
        payload: &[u8],
    ) -> Result<Verdict> {
        let rules = match self.compiled_for(&pack.id) {
            Some(rules) => rules,
            None => {
                self.preload(&pack.id, &pack.rules)?;
                self.compiled_for(&pack.id).unwrap_or_default()
            }
        };

        let document: Map<String, Value> = if payload.is_empty() {
            Map::new()
        } else {
            serde_json::from_slice(payload)?
        };

        for rule in rules.iter() {
            if cancel.is_cancelled() {
                return Err(GovernorError::Cancelled);
            }
            if let Some(Value::String(field)) = document.get(&rule.id) {
                if rule.pattern.is_match(field) {
                    return Ok(Verdict {
                        allowed: rule.allow,
                        reason: rule.description.clone(),
                    });
                }
            }
        }

        Ok(Verdict {
            allowed: false,
            reason: "no matching rule".to_string(),
        })
    }

    fn compiled_for(&self, rulepack_id: &str) -> Option<Arc<Vec<CompiledRule>>> {
        self.rules.read().get(rulepack_id).cloned()
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        RuleEvaluator::new()
    }
}
