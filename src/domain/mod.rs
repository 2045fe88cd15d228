pub mod decision;
pub mod rulepack;

pub use decision::{DecisionRequest, DecisionResult};
pub use rulepack::{RuleDefinition, Rulepack};
