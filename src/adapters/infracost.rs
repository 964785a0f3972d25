//! Infracost adapter for cost estimation.
//!
//! Runs `infracost breakdown --path <dir> --format json` as a subprocess
//! against a persisted plan directory. A non-zero exit status is an error,
//! never a result.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{AdapterError, CostEstimator};

/// Default process timeout when none is configured
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Cost estimator backed by the infracost CLI
pub struct InfracostEstimator {
    /// Path to the infracost binary (default: "infracost")
    binary_path: String,

    /// Upper bound for one breakdown process
    process_timeout: Duration,
}

impl Default for InfracostEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl InfracostEstimator {
    /// Create an estimator using `infracost` from PATH
    pub fn new() -> Self {
        Self::with_binary_path("infracost")
    }

    /// Create an estimator with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            process_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build from resolved configuration
    pub fn from_config(config: &crate::config::ResolvedConfig) -> Self {
        Self::with_binary_path(config.infracost.binary.clone())
            .with_timeout(config.limits.call_timeout())
    }

    pub fn with_timeout(mut self, process_timeout: Duration) -> Self {
        self.process_timeout = process_timeout;
        self
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Run a breakdown for one plan directory.
    ///
    /// The child is killed if this future is dropped (cancellation or an
    /// outer timeout).
    async fn run_breakdown(&self, plan_dir: &Path) -> Result<String, AdapterError> {
        debug!(dir = %plan_dir.display(), "Running infracost breakdown");

        let child = Command::new(&self.binary_path)
            .arg("breakdown")
            .arg("--path")
            .arg(plan_dir)
            .args(["--format", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = timeout(self.process_timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout(self.process_timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::ExitStatus {
                tool: self.binary_path.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| AdapterError::Malformed("infracost output is not valid UTF-8".into()))?;

        // Structured output is the contract; anything else is a failed run
        serde_json::from_str::<serde_json::Value>(&stdout)
            .map_err(|e| AdapterError::Malformed(format!("infracost output is not JSON: {}", e)))?;

        Ok(stdout)
    }

    /// Check that infracost is installed and runnable
    pub async fn health_check(&self) -> Result<String, AdapterError> {
        let output = Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::ExitStatus {
                tool: self.binary_path.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl CostEstimator for InfracostEstimator {
    async fn estimate(&self, artifact_location: &Path) -> Result<String, AdapterError> {
        self.run_breakdown(artifact_location).await
    }
}
