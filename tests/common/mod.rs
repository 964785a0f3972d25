//! Shared mock collaborators for integration tests.
//!
//! Every mock counts its calls so tests can assert that completed stages
//! are never repeated.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use infracompare::core::artifact_store::DEFINITION_FILE;
use infracompare::{
    AdapterError, ArtifactStore, Collaborators, Comparator, CostEstimator, PipelineEngine,
    PlanGenerator, Provider, ProviderPair, SafetyLimits, Summarizer,
};
use tempfile::TempDir;

pub const AWS_PLAN: &str = "aws terraform code";
pub const AZURE_PLAN: &str = "azure terraform code";
pub const COMPARISON: &str = "Azure is 12% cheaper for this workload";

/// Decrements a budget of injected failures; true while failures remain
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

async fn maybe_sleep(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Default)]
pub struct MockGenerator {
    pub calls: AtomicUsize,
    failures: AtomicUsize,
    empty_azure: bool,
}

impl MockGenerator {
    pub fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    /// Returns a blank Azure plan
    pub fn with_empty_azure() -> Self {
        Self {
            empty_azure: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PlanGenerator for MockGenerator {
    async fn generate(&self, _requirement_text: &str) -> Result<ProviderPair<String>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if take_failure(&self.failures) {
            return Err(AdapterError::Upstream {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        let azure = if self.empty_azure { "" } else { AZURE_PLAN };
        Ok(ProviderPair::new(AWS_PLAN.to_string(), azure.to_string()))
    }
}

#[derive(Default)]
pub struct MockSummarizer {
    pub calls: AtomicUsize,
    failures: AtomicUsize,
    output: Option<String>,
}

impl MockSummarizer {
    pub fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    /// Summarizer answering every text with the same output
    pub fn returning(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if take_failure(&self.failures) {
            return Err(AdapterError::Malformed("no choices".to_string()));
        }

        Ok(self
            .output
            .clone()
            .unwrap_or_else(|| format!("synthesis of: {}", text)))
    }
}

/// Estimator that checks the plan was persisted before pricing it
#[derive(Default)]
pub struct MockEstimator {
    pub calls: AtomicUsize,
    pub locations: Mutex<Vec<PathBuf>>,
    failing_provider: Option<Provider>,
    failures: AtomicUsize,
    delay: Option<Duration>,
}

impl MockEstimator {
    /// Fails the first `times` calls for `provider`
    pub fn failing_for(provider: Provider, times: usize) -> Self {
        Self {
            failing_provider: Some(provider),
            failures: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn locations(&self) -> Vec<PathBuf> {
        self.locations.lock().unwrap().clone()
    }
}

fn provider_of(location: &Path) -> Option<Provider> {
    location.file_name()?.to_str()?.parse().ok()
}

#[async_trait]
impl CostEstimator for MockEstimator {
    async fn estimate(&self, artifact_location: &Path) -> Result<String, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.locations
            .lock()
            .unwrap()
            .push(artifact_location.to_path_buf());

        maybe_sleep(self.delay).await;

        let provider = provider_of(artifact_location);
        if provider.is_some()
            && provider == self.failing_provider
            && take_failure(&self.failures)
        {
            return Err(AdapterError::ExitStatus {
                tool: "infracost".to_string(),
                code: 1,
                stderr: "Error: no valid Terraform files found".to_string(),
            });
        }

        let plan = tokio::fs::read_to_string(artifact_location.join(DEFINITION_FILE)).await?;

        Ok(serde_json::json!({
            "totalMonthlyCost": "42.00",
            "plan": plan,
        })
        .to_string())
    }
}

#[derive(Default)]
pub struct MockComparator {
    pub calls: AtomicUsize,
    delay: Option<Duration>,
    output: Option<String>,
}

impl MockComparator {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn returning(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Comparator for MockComparator {
    async fn compare(
        &self,
        requirement_text: &str,
        aws_cost_raw: &str,
        azure_cost_raw: &str,
    ) -> Result<String, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        maybe_sleep(self.delay).await;

        if aws_cost_raw.is_empty() || azure_cost_raw.is_empty() || requirement_text.is_empty() {
            return Err(AdapterError::Malformed("missing comparison input".to_string()));
        }

        Ok(self.output.clone().unwrap_or_else(|| COMPARISON.to_string()))
    }
}

/// One set of mocks, shared with the engine under test
#[derive(Clone)]
pub struct Mocks {
    pub generator: Arc<MockGenerator>,
    pub summarizer: Arc<MockSummarizer>,
    pub estimator: Arc<MockEstimator>,
    pub comparator: Arc<MockComparator>,
}

impl Default for Mocks {
    fn default() -> Self {
        Self {
            generator: Arc::new(MockGenerator::default()),
            summarizer: Arc::new(MockSummarizer::default()),
            estimator: Arc::new(MockEstimator::default()),
            comparator: Arc::new(MockComparator::default()),
        }
    }
}

impl Mocks {
    pub fn with_generator(mut self, generator: MockGenerator) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub fn with_summarizer(mut self, summarizer: MockSummarizer) -> Self {
        self.summarizer = Arc::new(summarizer);
        self
    }

    pub fn with_estimator(mut self, estimator: MockEstimator) -> Self {
        self.estimator = Arc::new(estimator);
        self
    }

    pub fn with_comparator(mut self, comparator: MockComparator) -> Self {
        self.comparator = Arc::new(comparator);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            generator: self.generator.clone(),
            summarizer: self.summarizer.clone(),
            estimator: self.estimator.clone(),
            comparator: self.comparator.clone(),
        }
    }

    /// (generator, summarizer, estimator, comparator) call counts
    pub fn calls(&self) -> (usize, usize, usize, usize) {
        (
            self.generator.calls.load(Ordering::SeqCst),
            self.summarizer.calls.load(Ordering::SeqCst),
            self.estimator.calls.load(Ordering::SeqCst),
            self.comparator.calls.load(Ordering::SeqCst),
        )
    }
}

pub fn plans_dir(temp: &TempDir) -> PathBuf {
    temp.path().join("terraform_plans")
}

pub fn runs_dir(temp: &TempDir) -> PathBuf {
    temp.path().join("runs")
}

/// In-memory engine with artifacts under `temp`
pub fn engine(mocks: &Mocks, temp: &TempDir) -> PipelineEngine {
    engine_with_limits(mocks, temp, SafetyLimits::default())
}

pub fn engine_with_limits(mocks: &Mocks, temp: &TempDir, limits: SafetyLimits) -> PipelineEngine {
    PipelineEngine::new(
        mocks.collaborators(),
        ArtifactStore::new(plans_dir(temp)),
        limits,
    )
}

/// Engine that journals runs under `temp`
pub fn journaled_engine(mocks: &Mocks, temp: &TempDir) -> PipelineEngine {
    engine(mocks, temp).with_journal(runs_dir(temp))
}
