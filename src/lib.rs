pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod governor;
pub mod observability;
pub mod pii;
pub mod storage;

pub use cache::RuleCache;
pub use config::Config;
pub use domain::{DecisionRequest, DecisionResult, RuleDefinition, Rulepack};
pub use error::{GovernorError, Result};
pub use evaluator::RuleEvaluator;
pub use governor::Governor;
pub use storage::{AuditRecord, AuditStore, MemoryStore};
