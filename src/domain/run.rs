//! Run state: the record threaded through every pipeline stage.
//!
//! A `RunState` is owned by whoever drives the run. Only the engine moves it
//! forward, and only through [`RunState::commit`], which enforces the
//! transition order and the write-once rule for stage fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provider::{Provider, ProviderPair};
use super::stage::{Stage, Transition};
use crate::error::{ErrorKind, PipelineError, PipelineResult};

/// State of one comparison request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    run_id: Uuid,
    requirement_text: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Last stage completed successfully
    checkpoint: Stage,

    /// Set while the transition out of `checkpoint` is failed
    #[serde(default)]
    failure: Option<StageFailure>,

    #[serde(default)]
    plans: Option<ProviderPair<String>>,
    #[serde(default)]
    plan_summaries: Option<ProviderPair<String>>,
    #[serde(default)]
    cost_estimates: Option<ProviderPair<String>>,
    #[serde(default)]
    cost_summaries: Option<ProviderPair<String>>,
    #[serde(default)]
    comparison_text: Option<String>,
    #[serde(default)]
    final_summary: Option<String>,
}

impl RunState {
    /// Create a run at `Created`. Callers go through `PipelineEngine::create_run`,
    /// which validates the requirement and allocates a unique id.
    pub(crate) fn new(run_id: Uuid, requirement_text: String) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            requirement_text,
            created_at: now,
            updated_at: now,
            checkpoint: Stage::Created,
            failure: None,
            plans: None,
            plan_summaries: None,
            cost_estimates: None,
            cost_summaries: None,
            comparison_text: None,
            final_summary: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn requirement_text(&self) -> &str {
        &self.requirement_text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Current stage: `Failed` while a failure is recorded, else the checkpoint
    pub fn stage(&self) -> Stage {
        if self.failure.is_some() {
            Stage::Failed
        } else {
            self.checkpoint
        }
    }

    /// Last stage completed successfully; the resume point after a failure
    pub fn checkpoint(&self) -> Stage {
        self.checkpoint
    }

    /// The failure recorded by the last attempted transition, if it failed
    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Transition the next `advance` will attempt
    pub fn pending_transition(&self) -> Option<Transition> {
        self.checkpoint.next_transition()
    }

    pub fn is_complete(&self) -> bool {
        self.checkpoint == Stage::Complete
    }

    pub fn plans(&self) -> Option<&ProviderPair<String>> {
        self.plans.as_ref()
    }

    pub fn plan_summaries(&self) -> Option<&ProviderPair<String>> {
        self.plan_summaries.as_ref()
    }

    pub fn cost_estimates(&self) -> Option<&ProviderPair<String>> {
        self.cost_estimates.as_ref()
    }

    pub fn cost_summaries(&self) -> Option<&ProviderPair<String>> {
        self.cost_summaries.as_ref()
    }

    pub fn plan(&self, provider: Provider) -> Option<&str> {
        self.plans.as_ref().map(|p| p.get(provider).as_str())
    }

    pub fn aws_plan(&self) -> Option<&str> {
        self.plan(Provider::Aws)
    }

    pub fn azure_plan(&self) -> Option<&str> {
        self.plan(Provider::Azure)
    }

    pub fn aws_plan_summary(&self) -> Option<&str> {
        self.value(Field::AwsPlanSummary)
    }

    pub fn azure_plan_summary(&self) -> Option<&str> {
        self.value(Field::AzurePlanSummary)
    }

    pub fn cost_raw(&self, provider: Provider) -> Option<&str> {
        self.cost_estimates.as_ref().map(|c| c.get(provider).as_str())
    }

    pub fn aws_cost_raw(&self) -> Option<&str> {
        self.cost_raw(Provider::Aws)
    }

    pub fn azure_cost_raw(&self) -> Option<&str> {
        self.cost_raw(Provider::Azure)
    }

    pub fn aws_cost_summary(&self) -> Option<&str> {
        self.value(Field::AwsCostSummary)
    }

    pub fn azure_cost_summary(&self) -> Option<&str> {
        self.value(Field::AzureCostSummary)
    }

    pub fn comparison_text(&self) -> Option<&str> {
        self.comparison_text.as_deref()
    }

    pub fn final_summary(&self) -> Option<&str> {
        self.final_summary.as_deref()
    }

    /// Committed value of a field
    pub fn value(&self, field: Field) -> Option<&str> {
        match field {
            Field::AwsPlan => pair_value(&self.plans, Provider::Aws),
            Field::AzurePlan => pair_value(&self.plans, Provider::Azure),
            Field::AwsPlanSummary => pair_value(&self.plan_summaries, Provider::Aws),
            Field::AzurePlanSummary => pair_value(&self.plan_summaries, Provider::Azure),
            Field::AwsCostRaw => pair_value(&self.cost_estimates, Provider::Aws),
            Field::AzureCostRaw => pair_value(&self.cost_estimates, Provider::Azure),
            Field::AwsCostSummary => pair_value(&self.cost_summaries, Provider::Aws),
            Field::AzureCostSummary => pair_value(&self.cost_summaries, Provider::Azure),
            Field::ComparisonText => self.comparison_text.as_deref(),
            Field::FinalSummary => self.final_summary.as_deref(),
        }
    }

    /// Field as a driving interface should present it
    pub fn view(&self, field: Field) -> FieldView<'_> {
        if let Some(value) = self.value(field) {
            return FieldView::Ready(value);
        }

        match &self.failure {
            Some(failure) if failure.transition == field.produced_by() => {
                FieldView::Failed(failure)
            }
            _ => FieldView::Pending,
        }
    }

    /// Commit the output of the next transition.
    ///
    /// Rejects outputs for any transition other than the one leaving the
    /// checkpoint, and never overwrites a field that is already set.
    pub(crate) fn commit(&mut self, output: StageOutput) -> PipelineResult<Stage> {
        let transition = output.transition();
        let out_of_order = PipelineError::OutOfOrder {
            transition,
            stage: self.stage(),
        };

        if self.checkpoint != transition.from() {
            return Err(out_of_order);
        }

        let filled = match output {
            StageOutput::Plans(plans) => fill(&mut self.plans, plans),
            StageOutput::PlanSummaries(summaries) => fill(&mut self.plan_summaries, summaries),
            StageOutput::CostEstimates(costs) => fill(&mut self.cost_estimates, costs),
            StageOutput::CostSummaries(summaries) => fill(&mut self.cost_summaries, summaries),
            StageOutput::Comparison(text) => fill(&mut self.comparison_text, text),
            StageOutput::FinalSummary(text) => fill(&mut self.final_summary, text),
        };

        if !filled {
            return Err(out_of_order);
        }

        self.checkpoint = transition.target();
        self.failure = None;
        self.updated_at = Utc::now();

        Ok(self.checkpoint)
    }

    /// Record a failed transition. Stage fields are left untouched.
    pub(crate) fn record_failure(&mut self, transition: Transition, error: &PipelineError) {
        self.failure = Some(StageFailure {
            transition,
            kind: error.kind(),
            message: error.to_string(),
            failed_at: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// Back to `Created`, keeping the id and requirement
    pub(crate) fn reset(&mut self) {
        self.checkpoint = Stage::Created;
        self.failure = None;
        self.plans = None;
        self.plan_summaries = None;
        self.cost_estimates = None;
        self.cost_summaries = None;
        self.comparison_text = None;
        self.final_summary = None;
        self.updated_at = Utc::now();
    }
}

fn pair_value(pair: &Option<ProviderPair<String>>, provider: Provider) -> Option<&str> {
    pair.as_ref().map(|p| p.get(provider).as_str())
}

fn fill<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}

/// Output of a single transition, committed as a unit
#[derive(Debug, Clone)]
pub(crate) enum StageOutput {
    Plans(ProviderPair<String>),
    PlanSummaries(ProviderPair<String>),
    CostEstimates(ProviderPair<String>),
    CostSummaries(ProviderPair<String>),
    Comparison(String),
    FinalSummary(String),
}

impl StageOutput {
    pub(crate) fn transition(&self) -> Transition {
        match self {
            StageOutput::Plans(_) => Transition::GeneratePlans,
            StageOutput::PlanSummaries(_) => Transition::SummarizePlans,
            StageOutput::CostEstimates(_) => Transition::EstimateCosts,
            StageOutput::CostSummaries(_) => Transition::SummarizeCosts,
            StageOutput::Comparison(_) => Transition::CompareCosts,
            StageOutput::FinalSummary(_) => Transition::SummarizeComparison,
        }
    }

    /// Total bytes produced, for logging
    pub(crate) fn size_bytes(&self) -> usize {
        match self {
            StageOutput::Plans(p)
            | StageOutput::PlanSummaries(p)
            | StageOutput::CostEstimates(p)
            | StageOutput::CostSummaries(p) => p.aws.len() + p.azure.len(),
            StageOutput::Comparison(s) | StageOutput::FinalSummary(s) => s.len(),
        }
    }
}

/// Failure of the transition out of the checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub transition: Transition,
    pub kind: ErrorKind,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

/// Displayable outputs of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    AwsPlan,
    AzurePlan,
    AwsPlanSummary,
    AzurePlanSummary,
    AwsCostRaw,
    AzureCostRaw,
    AwsCostSummary,
    AzureCostSummary,
    ComparisonText,
    FinalSummary,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::AwsPlan,
        Field::AzurePlan,
        Field::AwsPlanSummary,
        Field::AzurePlanSummary,
        Field::AwsCostRaw,
        Field::AzureCostRaw,
        Field::AwsCostSummary,
        Field::AzureCostSummary,
        Field::ComparisonText,
        Field::FinalSummary,
    ];

    /// Transition that writes this field
    pub fn produced_by(&self) -> Transition {
        match self {
            Field::AwsPlan | Field::AzurePlan => Transition::GeneratePlans,
            Field::AwsPlanSummary | Field::AzurePlanSummary => Transition::SummarizePlans,
            Field::AwsCostRaw | Field::AzureCostRaw => Transition::EstimateCosts,
            Field::AwsCostSummary | Field::AzureCostSummary => Transition::SummarizeCosts,
            Field::ComparisonText => Transition::CompareCosts,
            Field::FinalSummary => Transition::SummarizeComparison,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::AwsPlan => "AWS infrastructure plan",
            Field::AzurePlan => "Azure infrastructure plan",
            Field::AwsPlanSummary => "AWS infrastructure analysis",
            Field::AzurePlanSummary => "Azure infrastructure analysis",
            Field::AwsCostRaw => "AWS raw cost breakdown",
            Field::AzureCostRaw => "Azure raw cost breakdown",
            Field::AwsCostSummary => "AWS cost analysis",
            Field::AzureCostSummary => "Azure cost analysis",
            Field::ComparisonText => "Cost comparison",
            Field::FinalSummary => "Final analysis",
        }
    }
}

/// Three-way presentation of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldView<'a> {
    /// Producing stage not reached yet
    Pending,

    /// Producing stage failed
    Failed(&'a StageFailure),

    /// Committed value
    Ready(&'a str),
}
