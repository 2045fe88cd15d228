use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the governor and its collaborators.
///
/// Construction failures (`Config`) are fatal; everything else is returned
/// per-call from `Governor::evaluate` or `Governor::queue`. A "no matching
/// rule" outcome is a successful default-deny decision, not an error.
#[derive(Error, Debug)]
pub enum GovernorError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("offline mode enabled: rulepack {rulepack_id} not cached")]
    OfflineUnavailable { rulepack_id: String },

    #[error("fetch rulepack {rulepack_id}: {source}")]
    Fetch {
        rulepack_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetch rulepack {rulepack_id}: unexpected status {status}")]
    FetchStatus { rulepack_id: String, status: u16 },

    #[error("compile rule {rule_id}: {source}")]
    Compile {
        rule_id: String,
        #[source]
        source: regex::Error,
    },

    #[error("payload parse error: {0}")]
    PayloadParse(#[from] serde_json::Error),

    #[error("offline queue full")]
    QueueFull,

    #[error("offline queue closed")]
    QueueClosed,

    #[error("queue requires offline mode")]
    QueueDisabled,

    #[error("evaluation cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl GovernorError {
    /// True for any failure talking to the remote rulepack source.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            GovernorError::Fetch { .. } | GovernorError::FetchStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GovernorError>;
