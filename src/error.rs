//! Error types for pipeline operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::AdapterError;
use crate::core::safety::SafetyViolation;
use crate::domain::{Provider, Stage, Transition};

/// Errors returned by the pipeline engine
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Requirement text rejected before a run was created
    #[error("Invalid requirement: {0}")]
    Validation(SafetyViolation),

    /// Plan generator failed or returned unusable output
    #[error("Plan generation failed: {0}")]
    Generation(#[source] AdapterError),

    /// Summarizer failed for one of the summarized texts
    #[error("Summarization of {subject} failed: {source}")]
    Summarization {
        subject: String,
        #[source]
        source: AdapterError,
    },

    /// Cost estimator failed for a provider's artifact
    #[error("Cost estimation for {provider} failed: {source}")]
    Estimation {
        provider: Provider,
        #[source]
        source: AdapterError,
    },

    /// Comparator failed
    #[error("Cost comparison failed: {0}")]
    Comparison(#[source] AdapterError),

    /// Artifact or journal could not be written or read
    #[error("Failed to persist {what}: {source}")]
    Persistence {
        what: String,
        #[source]
        source: std::io::Error,
    },

    /// Caller cancelled the advance; nothing was committed
    #[error("Cancelled during {0}")]
    Cancelled(Transition),

    /// A stage output was offered to a run that is not ready for it
    #[error("Output of {transition} cannot be committed to a run at stage {stage}")]
    OutOfOrder { transition: Transition, stage: Stage },
}

impl PipelineError {
    pub(crate) fn persistence(what: impl Into<String>, source: std::io::Error) -> Self {
        Self::Persistence {
            what: what.into(),
            source,
        }
    }

    pub(crate) fn summarization(subject: impl Into<String>, source: AdapterError) -> Self {
        Self::Summarization {
            subject: subject.into(),
            source,
        }
    }

    /// Coarse classification, recorded on the run when a stage fails
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Generation(_) => ErrorKind::Generation,
            PipelineError::Summarization { .. } => ErrorKind::Summarization,
            PipelineError::Estimation { .. } => ErrorKind::Estimation,
            PipelineError::Comparison(_) => ErrorKind::Comparison,
            PipelineError::Persistence { .. } => ErrorKind::Persistence,
            PipelineError::Cancelled(_) => ErrorKind::Cancelled,
            PipelineError::OutOfOrder { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if calling `advance` again may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Validation(_) | PipelineError::OutOfOrder { .. }
        )
    }

    /// Returns true if the underlying collaborator call timed out.
    pub fn is_timeout(&self) -> bool {
        match self {
            PipelineError::Generation(e) | PipelineError::Comparison(e) => e.is_timeout(),
            PipelineError::Summarization { source, .. }
            | PipelineError::Estimation { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Serializable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Generation,
    Summarization,
    Estimation,
    Comparison,
    Persistence,
    Cancelled,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Generation => "generation",
            ErrorKind::Summarization => "summarization",
            ErrorKind::Estimation => "estimation",
            ErrorKind::Comparison => "comparison",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
