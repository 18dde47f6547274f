use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that terminate the pipeline. Per-entity drops (degenerate geometry,
/// undecodable entities) are counted in stage metrics, never raised.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The input document cannot be parsed or the selected-layer set is empty.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The detector received more lines than the configured safety cap.
    #[error("oversized input: {lines} lines exceeds cap of {cap}")]
    OversizedInput { lines: usize, cap: usize },

    /// A required upstream bundle entry is missing or a stage produced a
    /// non-finite quantity. Indicates a programming error, not a data error.
    #[error("corrupt upstream: {0}")]
    CorruptUpstream(String),

    /// The artifact sink kept failing after retries.
    #[error("artifact sink unavailable: {0}")]
    SinkUnavailable(String),

    /// Cooperative shutdown was requested between stages.
    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Terse machine-readable kind, surfaced on the job record.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "INVALID_INPUT",
            PipelineError::OversizedInput { .. } => "OVERSIZED_INPUT",
            PipelineError::CorruptUpstream(_) => "CORRUPT_UPSTREAM",
            PipelineError::SinkUnavailable(_) => "SINK_UNAVAILABLE",
            PipelineError::Cancelled => "CANCELLED",
        }
    }
}

/// Promotes a non-finite value to [`PipelineError::CorruptUpstream`].
pub fn ensure_finite(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PipelineError::CorruptUpstream(format!(
            "non-finite {what}: {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(PipelineError::Cancelled.kind(), "CANCELLED");
        assert_eq!(
            PipelineError::OversizedInput { lines: 9, cap: 1 }.kind(),
            "OVERSIZED_INPUT"
        );
    }

    #[test]
    fn ensure_finite_promotes_nan() {
        assert!(ensure_finite(f64::NAN, "distance").is_err());
        assert_eq!(ensure_finite(2.0, "distance").unwrap(), 2.0);
    }
}
