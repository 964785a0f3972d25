//! Capability interfaces for external collaborators.
//!
//! The engine only talks to these traits. Concrete implementations:
//! - `OpenAiClient`: plan generation, summarization, comparison
//! - `InfracostEstimator`: cost estimation via the `infracost` CLI

pub mod infracost;
pub mod openai;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ProviderPair;

// Re-export the concrete adapters
pub use infracost::InfracostEstimator;
pub use openai::OpenAiClient;

/// Errors raised by collaborator implementations
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed output: {0}")]
    Malformed(String),

    #[error("{tool} exited with code {code}: {stderr}")]
    ExitStatus {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl AdapterError {
    pub fn is_timeout(&self) -> bool {
        match self {
            AdapterError::Timeout(_) => true,
            AdapterError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Produces provider-specific infrastructure definitions from a requirement
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Generate one Terraform configuration per provider
    async fn generate(&self, requirement_text: &str) -> Result<ProviderPair<String>, AdapterError>;
}

/// Produces a short synthesis of generated text
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, AdapterError>;
}

/// Produces a structured cost breakdown for a directory of definitions
#[async_trait]
pub trait CostEstimator: Send + Sync {
    /// `artifact_location` is a directory as returned by `ArtifactStore::location_of`
    async fn estimate(&self, artifact_location: &Path) -> Result<String, AdapterError>;
}

/// Produces a cross-provider cost analysis
#[async_trait]
pub trait Comparator: Send + Sync {
    async fn compare(
        &self,
        requirement_text: &str,
        aws_cost_raw: &str,
        azure_cost_raw: &str,
    ) -> Result<String, AdapterError>;
}
