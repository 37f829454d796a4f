//! Error types for the reporting pipeline.

use std::fmt;
use thiserror::Error;

/// A retried unit of work in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ProjectList,
    ExperimentList,
    Experiment,
    Delivery,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ProjectList => write!(f, "project-list"),
            Stage::ExperimentList => write!(f, "experiment-list"),
            Stage::Experiment => write!(f, "experiment-processing"),
            Stage::Delivery => write!(f, "delivery"),
        }
    }
}

/// Inconsistent stat records for a single experiment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("no stat record has status 'baseline'")]
    MissingBaseline,
    #[error("stat records disagree on the baseline variation ({expected} vs {found})")]
    InconsistentBaseline { expected: String, found: String },
    #[error("variation id {0:?} is not numeric")]
    InvalidVariationId(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} failed for {key} after {attempts} attempt(s): {source:#}")]
    StageFailure {
        stage: Stage,
        key: String,
        attempts: u32,
        source: anyhow::Error,
    },
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

impl PipelineError {
    /// Stage that exhausted its retries, if this is a stage failure.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::StageFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::ProjectList.to_string(), "project-list");
        assert_eq!(Stage::Experiment.to_string(), "experiment-processing");
    }

    #[test]
    fn test_stage_failure_message_names_stage_and_key() {
        let err = PipelineError::StageFailure {
            stage: Stage::ExperimentList,
            key: "project 42".to_string(),
            attempts: 3,
            source: anyhow::anyhow!("HTTP 503"),
        };

        let message = err.to_string();
        assert!(message.contains("experiment-list"));
        assert!(message.contains("project 42"));
        assert!(message.contains("HTTP 503"));
        assert_eq!(err.stage(), Some(Stage::ExperimentList));
    }

    #[test]
    fn test_aggregation_error_has_no_stage() {
        let err = PipelineError::from(AggregationError::MissingBaseline);
        assert_eq!(err.stage(), None);
        assert!(err.to_string().contains("baseline"));
    }
}
