use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, versioned, ordered collection of rule definitions.
///
/// Identity is the `id`; `version` is advisory and is not compared against
/// cached copies. Rule order is significant: evaluation walks `rules` in
/// definition order and the first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rulepack {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    pub updated_at: DateTime<Utc>,
}

/// A single rule as delivered by the control plane.
///
/// `pattern` is regular-expression source text; it is compiled lazily on the
/// first evaluation of the owning rulepack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    #[serde(default)]
    pub allow: bool,
}
