//! Safety limits for pipeline execution.
//!
//! Bounds every collaborator call with:
//! - A per-call timeout
//! - Requirement and output size limits
//! - A switch for issuing provider sub-calls concurrently

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Safety limits for pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Timeout for each collaborator call in seconds (default: 300 = 5 min)
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Maximum requirement text size in bytes (default: 64KB)
    #[serde(default = "default_max_requirement_bytes")]
    pub max_requirement_bytes: u64,

    /// Maximum size of any single collaborator output in bytes (default: 10MB)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,

    /// Issue the AWS and Azure sub-calls of a stage concurrently (default: true)
    #[serde(default = "default_parallel_providers")]
    pub parallel_providers: bool,
}

fn default_call_timeout() -> u64 {
    300
} // 5 min
fn default_max_requirement_bytes() -> u64 {
    64 * 1024
} // 64KB
fn default_max_output_bytes() -> u64 {
    10 * 1024 * 1024
} // 10MB
fn default_parallel_providers() -> bool {
    true
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            call_timeout_seconds: default_call_timeout(),
            max_requirement_bytes: default_max_requirement_bytes(),
            max_output_bytes: default_max_output_bytes(),
            parallel_providers: default_parallel_providers(),
        }
    }
}

impl SafetyLimits {
    /// Timeout applied to each collaborator call
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Validate requirement text before a run is created
    pub fn validate_requirement(&self, text: &str) -> Result<(), SafetyViolation> {
        if text.trim().is_empty() {
            return Err(SafetyViolation::EmptyRequirement);
        }

        let size = text.len() as u64;
        if size > self.max_requirement_bytes {
            return Err(SafetyViolation::RequirementTooLarge {
                actual: size,
                limit: self.max_requirement_bytes,
            });
        }

        Ok(())
    }

    /// Validate a collaborator output before it is committed
    pub fn validate_output(&self, output: &str) -> Result<(), SafetyViolation> {
        if output.trim().is_empty() {
            return Err(SafetyViolation::EmptyOutput);
        }

        let size = output.len() as u64;
        if size > self.max_output_bytes {
            return Err(SafetyViolation::OutputTooLarge {
                actual: size,
                limit: self.max_output_bytes,
            });
        }
        Ok(())
    }
}

/// Safety violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyViolation {
    #[error("Requirement text is empty")]
    EmptyRequirement,

    #[error("Requirement text too large: {actual} > {limit} bytes")]
    RequirementTooLarge { actual: u64, limit: u64 },

    #[error("Output is empty")]
    EmptyOutput,

    #[error("Output too large: {actual} > {limit} bytes")]
    OutputTooLarge { actual: u64, limit: u64 },
}
