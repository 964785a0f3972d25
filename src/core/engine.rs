//! Resumable pipeline engine.
//!
//! Drives a caller-owned [`RunState`] through the fixed transition table,
//! one transition per [`PipelineEngine::advance`] call. Each transition
//! either commits all of its outputs and moves the checkpoint forward, or
//! commits nothing and records a failure. A later `advance` retries the
//! failed transition from the same checkpoint.
//!
//! When a journal root is configured every attempt is logged to the run's
//! event log and the state snapshot is replaced after every change.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    AdapterError, Comparator, CostEstimator, InfracostEstimator, OpenAiClient, PlanGenerator,
    Summarizer,
};
use crate::config::ResolvedConfig;
use crate::domain::{Event, EventType, Provider, ProviderPair, RunState, Stage, StageOutput, Transition};
use crate::error::{PipelineError, PipelineResult};

use super::artifact_store::ArtifactStore;
use super::cancel::CancelSignal;
use super::event_store::{generate_idempotency_key, EventStore};
use super::safety::SafetyLimits;

/// External capabilities the engine calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn PlanGenerator>,
    pub summarizer: Arc<dyn Summarizer>,
    pub estimator: Arc<dyn CostEstimator>,
    pub comparator: Arc<dyn Comparator>,
}

impl Collaborators {
    /// OpenAI for the language model roles, infracost for estimation
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let openai = Arc::new(OpenAiClient::from_config(config)?);

        Ok(Self {
            generator: openai.clone(),
            summarizer: openai.clone(),
            estimator: Arc::new(InfracostEstimator::from_config(config)),
            comparator: openai,
        })
    }
}

/// Pipeline engine
pub struct PipelineEngine {
    collaborators: Collaborators,
    artifacts: ArtifactStore,
    limits: SafetyLimits,
    /// Root of per-run journals; None keeps runs in memory only
    runs_root: Option<PathBuf>,
}

impl PipelineEngine {
    /// Create an engine without a journal
    pub fn new(collaborators: Collaborators, artifacts: ArtifactStore, limits: SafetyLimits) -> Self {
        Self {
            collaborators,
            artifacts,
            limits,
            runs_root: None,
        }
    }

    /// Journal every run under `runs_root`
    pub fn with_journal(mut self, runs_root: impl Into<PathBuf>) -> Self {
        self.runs_root = Some(runs_root.into());
        self
    }

    /// Build a journaled engine with the configured collaborators
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let engine = Self::new(
            Collaborators::from_config(config)?,
            ArtifactStore::new(config.artifacts.clone()),
            config.limits.clone(),
        );
        Ok(engine.with_journal(config.runs_dir()))
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Validate the requirement and create a fresh run at `Created`.
    ///
    /// No collaborator is called. The run id is never shared with an
    /// existing run's artifacts or journal.
    #[instrument(skip(self, requirement_text))]
    pub async fn create_run(&self, requirement_text: impl Into<String>) -> PipelineResult<RunState> {
        let requirement_text = requirement_text.into();
        self.limits
            .validate_requirement(&requirement_text)
            .map_err(PipelineError::Validation)?;

        let mut run_id = Uuid::new_v4();
        while self.is_taken(run_id) {
            run_id = Uuid::new_v4();
        }

        let run = RunState::new(run_id, requirement_text);
        info!(%run_id, bytes = run.requirement_text().len(), "Created run");

        if let Some(store) = self.journal(run_id).await? {
            store
                .append(&Event::new(
                    run_id,
                    None,
                    EventType::RunCreated,
                    format!("{}:created", run_id),
                    format!("Requirement of {} bytes", run.requirement_text().len()),
                    Stage::Created,
                ))
                .await?;
            store.save_state(&run).await?;
        }

        Ok(run)
    }

    /// Perform the transition out of the run's checkpoint.
    ///
    /// On a `Complete` run this is a no-op.
    pub async fn advance(&self, run: &mut RunState) -> PipelineResult<Stage> {
        self.advance_with(run, &CancelSignal::never()).await
    }

    /// Like [`advance`](Self::advance), abandoning the stage if `cancel`
    /// fires. A cancelled stage leaves `run` exactly as it was.
    #[instrument(skip(self, run, cancel), fields(run_id = %run.run_id()))]
    pub async fn advance_with(
        &self,
        run: &mut RunState,
        cancel: &CancelSignal,
    ) -> PipelineResult<Stage> {
        let Some(transition) = run.pending_transition() else {
            debug!("Run already complete");
            return Ok(run.stage());
        };

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(transition));
        }

        let idem_key =
            generate_idempotency_key(run.run_id(), transition, &transition_input(run, transition));

        let store = match self.journal(run.run_id()).await {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "Failed to open run journal");
                self.fail(None, run, transition, &idem_key, 0, &e).await;
                return Err(e);
            }
        };

        if let Some(ref store) = store {
            let started = Event::new(
                run.run_id(),
                Some(transition),
                EventType::StageStarted,
                idem_key.clone(),
                transition.activity().to_string(),
                run.stage(),
            );
            if let Err(e) = store.append(&started).await {
                error!(error = %e, "Failed to journal stage start");
                self.fail(Some(store), run, transition, &idem_key, 0, &e).await;
                return Err(e);
            }
        }

        info!(%transition, from = %transition.from(), "{}", transition.activity());
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled(transition)),
            result = self.execute(run, transition) => result,
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let bytes = output.size_bytes();

                // Commit on a copy so a failed snapshot leaves the run untouched
                let mut next = run.clone();
                let stage = next.commit(output)?;

                if let Some(ref store) = store {
                    if let Err(e) = store.save_state(&next).await {
                        error!(error = %e, "Failed to save run snapshot");
                        self.fail(Some(store), run, transition, &idem_key, duration_ms, &e)
                            .await;
                        return Err(e);
                    }
                }

                *run = next;
                info!(%transition, %stage, duration_ms, bytes, "Stage completed");

                if let Some(ref store) = store {
                    self.log(
                        store,
                        Event::new(
                            run.run_id(),
                            Some(transition),
                            EventType::StageCompleted,
                            idem_key,
                            format!("{} bytes produced", bytes),
                            stage,
                        )
                        .with_duration(duration_ms),
                    )
                    .await;

                    if stage == Stage::Complete {
                        self.log(
                            store,
                            Event::new(
                                run.run_id(),
                                None,
                                EventType::RunCompleted,
                                format!("{}:complete", run.run_id()),
                                "Final analysis ready".to_string(),
                                stage,
                            ),
                        )
                        .await;
                    }
                }

                Ok(stage)
            }
            Err(PipelineError::Cancelled(_)) => {
                warn!(%transition, duration_ms, "Stage cancelled");

                if let Some(ref store) = store {
                    self.log(
                        store,
                        Event::new(
                            run.run_id(),
                            Some(transition),
                            EventType::StageCancelled,
                            idem_key,
                            "Cancelled by caller".to_string(),
                            run.stage(),
                        )
                        .with_duration(duration_ms),
                    )
                    .await;
                }

                Err(PipelineError::Cancelled(transition))
            }
            Err(e) => {
                error!(%transition, error = %e, duration_ms, "Stage failed");
                self.fail(store.as_ref(), run, transition, &idem_key, duration_ms, &e)
                    .await;
                Err(e)
            }
        }
    }

    /// Advance until `Complete`, reporting each committed stage.
    ///
    /// Stops at the first error with the run left at its checkpoint.
    pub async fn run_to_completion<F>(
        &self,
        run: &mut RunState,
        cancel: &CancelSignal,
        mut on_progress: F,
    ) -> PipelineResult<Stage>
    where
        F: FnMut(&RunState),
    {
        while !run.is_complete() {
            self.advance_with(run, cancel).await?;
            on_progress(run);
        }

        Ok(run.stage())
    }

    /// Return the run to `Created`, clearing every stage output.
    ///
    /// The run id, and with it every artifact location, is kept. Plan files
    /// stay on disk until the next GeneratePlans overwrites them.
    #[instrument(skip(self, run), fields(run_id = %run.run_id()))]
    pub async fn restart(&self, run: &mut RunState) -> PipelineResult<()> {
        run.reset();

        if let Some(store) = self.journal(run.run_id()).await? {
            store.save_state(run).await?;
            self.log(
                &store,
                Event::new(
                    run.run_id(),
                    None,
                    EventType::RunRestarted,
                    format!("{}:restart", run.run_id()),
                    "Run reset to created".to_string(),
                    Stage::Created,
                ),
            )
            .await;
        }

        info!("Run restarted");
        Ok(())
    }

    /// Load a journaled run from its snapshot
    pub async fn load_run(&self, run_id: Uuid) -> PipelineResult<Option<RunState>> {
        let Some(root) = self.runs_root.as_deref() else {
            return Ok(None);
        };

        if !EventStore::exists(root, run_id) {
            return Ok(None);
        }

        EventStore::locate(root, run_id).load_state().await
    }

    /// Delete a run's artifacts and journal
    pub async fn delete_run(&self, run_id: Uuid) -> PipelineResult<()> {
        self.artifacts.remove_run(run_id).await?;

        if let Some(root) = self.runs_root.as_deref() {
            EventStore::locate(root, run_id).remove().await?;
        }

        info!(%run_id, "Deleted run");
        Ok(())
    }

    /// Produce the outputs of one transition without touching the run
    async fn execute(&self, run: &RunState, transition: Transition) -> PipelineResult<StageOutput> {
        let run_id = run.run_id();
        let missing = || PipelineError::OutOfOrder {
            transition,
            stage: run.stage(),
        };

        match transition {
            Transition::GeneratePlans => {
                let plans = self
                    .bounded(self.collaborators.generator.generate(run.requirement_text()))
                    .await
                    .and_then(|plans| {
                        self.checked(&plans.aws)?;
                        self.checked(&plans.azure)?;
                        Ok(plans)
                    })
                    .map_err(PipelineError::Generation)?;

                for provider in Provider::ALL {
                    self.artifacts.write(run_id, provider, plans.get(provider)).await?;
                }

                Ok(StageOutput::Plans(plans))
            }
            Transition::SummarizePlans => {
                let plans = run.plans().ok_or_else(missing)?;
                let summaries = self
                    .both(move |provider| async move {
                        self.summarize(plans.get(provider))
                            .await
                            .map_err(|e| {
                                PipelineError::summarization(
                                    format!("{} plan", provider.display_name()),
                                    e,
                                )
                            })
                    })
                    .await?;

                Ok(StageOutput::PlanSummaries(summaries))
            }
            Transition::EstimateCosts => {
                let plans = run.plans().ok_or_else(missing)?;
                let estimates = self
                    .both(move |provider| async move {
                        let location = self.ensure_artifact(run_id, provider, plans).await?;
                        self.bounded(self.collaborators.estimator.estimate(&location))
                            .await
                            .and_then(|raw| self.checked(&raw).map(|_| raw))
                            .map_err(|source| PipelineError::Estimation { provider, source })
                    })
                    .await?;

                Ok(StageOutput::CostEstimates(estimates))
            }
            Transition::SummarizeCosts => {
                let estimates = run.cost_estimates().ok_or_else(missing)?;
                let summaries = self
                    .both(move |provider| async move {
                        self.summarize(estimates.get(provider))
                            .await
                            .map_err(|e| {
                                PipelineError::summarization(
                                    format!("{} cost estimate", provider.display_name()),
                                    e,
                                )
                            })
                    })
                    .await?;

                Ok(StageOutput::CostSummaries(summaries))
            }
            Transition::CompareCosts => {
                let estimates = run.cost_estimates().ok_or_else(missing)?;
                let comparison = self
                    .bounded(self.collaborators.comparator.compare(
                        run.requirement_text(),
                        &estimates.aws,
                        &estimates.azure,
                    ))
                    .await
                    .and_then(|text| self.checked(&text).map(|_| text))
                    .map_err(PipelineError::Comparison)?;

                Ok(StageOutput::Comparison(comparison))
            }
            Transition::SummarizeComparison => {
                let comparison = run.comparison_text().ok_or_else(missing)?;
                let summary = self
                    .summarize(comparison)
                    .await
                    .map_err(|e| PipelineError::summarization("comparison", e))?;

                Ok(StageOutput::FinalSummary(summary))
            }
        }
    }

    /// Run one sub-call per provider, concurrently unless disabled.
    ///
    /// On the first error the other sub-call is dropped.
    async fn both<F, Fut>(&self, call: F) -> PipelineResult<ProviderPair<String>>
    where
        F: Fn(Provider) -> Fut,
        Fut: Future<Output = PipelineResult<String>>,
    {
        if self.limits.parallel_providers {
            let (aws, azure) = tokio::try_join!(call(Provider::Aws), call(Provider::Azure))?;
            Ok(ProviderPair::new(aws, azure))
        } else {
            let aws = call(Provider::Aws).await?;
            let azure = call(Provider::Azure).await?;
            Ok(ProviderPair::new(aws, azure))
        }
    }

    async fn summarize(&self, text: &str) -> Result<String, AdapterError> {
        let summary = self.bounded(self.collaborators.summarizer.summarize(text)).await?;
        self.checked(&summary)?;
        Ok(summary)
    }

    /// Apply the per-call timeout to a collaborator call
    async fn bounded<T, Fut>(&self, call: Fut) -> Result<T, AdapterError>
    where
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let limit = self.limits.call_timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| AdapterError::Timeout(limit))?
    }

    /// Reject empty or oversized collaborator output
    fn checked(&self, output: &str) -> Result<(), AdapterError> {
        self.limits
            .validate_output(output)
            .map_err(|violation| AdapterError::Malformed(violation.to_string()))
    }

    /// Location of a provider's plan, rewriting it from the run if the file
    /// has gone missing since generation
    async fn ensure_artifact(
        &self,
        run_id: Uuid,
        provider: Provider,
        plans: &ProviderPair<String>,
    ) -> PipelineResult<PathBuf> {
        if self.artifacts.definition_path(run_id, provider).exists() {
            return Ok(self.artifacts.location_of(run_id, provider));
        }

        warn!(%run_id, %provider, "Plan artifact missing, rewriting from run state");
        self.artifacts.write(run_id, provider, plans.get(provider)).await
    }

    /// Record a failed transition on the run and in the journal.
    ///
    /// The in-memory run always carries the failure. If the snapshot write
    /// fails too, the journal lags behind it until the next successful save.
    async fn fail(
        &self,
        store: Option<&EventStore>,
        run: &mut RunState,
        transition: Transition,
        idem_key: &str,
        duration_ms: u64,
        error: &PipelineError,
    ) {
        run.record_failure(transition, error);

        let Some(store) = store else {
            return;
        };

        if let Err(e) = store.save_state(run).await {
            error!(error = %e, "Failed to save snapshot after stage failure");
        }

        self.log(
            store,
            Event::new(
                run.run_id(),
                Some(transition),
                EventType::StageFailed,
                idem_key.to_string(),
                format!("{} failed", transition),
                run.stage(),
            )
            .with_duration(duration_ms)
            .with_error(error.to_string()),
        )
        .await;
    }

    /// Append an event after the outcome is already decided; failures are
    /// logged, not returned
    async fn log(&self, store: &EventStore, event: Event) {
        if let Err(e) = store.append(&event).await {
            warn!(error = %e, event_type = ?event.event_type, "Failed to append event");
        }
    }

    async fn journal(&self, run_id: Uuid) -> PipelineResult<Option<EventStore>> {
        match self.runs_root.as_deref() {
            Some(root) => Ok(Some(EventStore::open(root, run_id).await?)),
            None => Ok(None),
        }
    }

    fn is_taken(&self, run_id: Uuid) -> bool {
        self.artifacts.contains_run(run_id)
            || self
                .runs_root
                .as_deref()
                .is_some_and(|root| EventStore::locate(root, run_id).run_dir().exists())
    }
}

/// Inputs a transition consumes, hashed into its idempotency key
fn transition_input(run: &RunState, transition: Transition) -> String {
    let pair = |pair: Option<&ProviderPair<String>>| {
        pair.map(|p| format!("{}\n{}", p.aws, p.azure))
            .unwrap_or_default()
    };

    match transition {
        Transition::GeneratePlans => run.requirement_text().to_string(),
        Transition::SummarizePlans | Transition::EstimateCosts => pair(run.plans()),
        Transition::SummarizeCosts => pair(run.cost_estimates()),
        Transition::CompareCosts => {
            format!("{}\n{}", run.requirement_text(), pair(run.cost_estimates()))
        }
        Transition::SummarizeComparison => run.comparison_text().unwrap_or_default().to_string(),
    }
}
