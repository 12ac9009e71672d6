//! Error taxonomy for the gate, scoring pipeline and alert bus

use thiserror::Error;

/// Policy outcome for a rejected caller. Not a fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateDenial {
    /// Caller matched a deny rule, or its identity could not be parsed
    #[error("access denied: {0}")]
    Blacklisted(String),

    /// Caller exceeded its request budget for the current window
    #[error("too many requests: {count} in the last {window_secs}s (limit {limit})")]
    RateLimited {
        count: usize,
        limit: usize,
        window_secs: u64,
    },
}

impl GateDenial {
    /// Short tag used in audit records and metrics
    pub fn tag(&self) -> &'static str {
        match self {
            GateDenial::Blacklisted(_) => "blacklisted",
            GateDenial::RateLimited { .. } => "rate_limited",
        }
    }
}

/// Failure of one ingestion cycle, surfaced synchronously to the caller
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Denied(#[from] GateDenial),

    /// Submitted transaction is out of range; nothing was scored
    #[error(transparent)]
    Invalid(#[from] InvalidTransaction),

    /// Score provider absent or not ready; the request is never scored as benign
    #[error("scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Transaction attribute outside its accepted range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transaction: {field} {reason}")]
pub struct InvalidTransaction {
    pub field: &'static str,
    pub reason: String,
}

/// Failure reported by a score provider
#[derive(Debug, Error)]
pub enum ScoringError {
    /// Backing classifier absent or not loaded
    #[error("{0}")]
    Unavailable(String),

    /// Classifier ran but produced no usable probability
    #[error("inference failed: {0}")]
    Inference(#[source] anyhow::Error),
}

impl From<ScoringError> for PipelineError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::Unavailable(msg) => PipelineError::ScoringUnavailable(msg),
            ScoringError::Inference(e) => PipelineError::Internal(e),
        }
    }
}

/// Per-subscriber delivery failure. Absorbed inside the alert bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber channel closed")]
    Closed,

    #[error("subscriber did not accept the event within {0}ms")]
    Timeout(u64),
}

/// Invalid network rule in configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid network rule '{rule}': {reason}")]
pub struct RuleParseError {
    pub rule: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_display() {
        let err = GateDenial::RateLimited {
            count: 101,
            limit: 100,
            window_secs: 60,
        };
        assert_eq!(
            err.to_string(),
            "too many requests: 101 in the last 60s (limit 100)"
        );
        assert_eq!(err.tag(), "rate_limited");
    }

    #[test]
    fn test_pipeline_error_from_denial() {
        let err: PipelineError = GateDenial::Blacklisted("10.0.0.1".to_string()).into();
        assert!(matches!(err, PipelineError::Denied(GateDenial::Blacklisted(_))));
        assert_eq!(err.to_string(), "access denied: 10.0.0.1");
    }
}
