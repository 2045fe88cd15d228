use std::time::Duration;

/// An authorization decision request: which rulepack to apply and the raw
/// JSON payload to evaluate.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub rulepack_id: String,
    pub payload: Vec<u8>,
}

impl DecisionRequest {
    pub fn new(rulepack_id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        DecisionRequest {
            rulepack_id: rulepack_id.into(),
            payload: payload.into(),
        }
    }
}

/// The outcome of a decision evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionResult {
    pub allowed: bool,
    pub reason: String,
    pub latency: Duration,
}

impl DecisionResult {
    /// Latency in whole milliseconds, as reported in audit records.
    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}
