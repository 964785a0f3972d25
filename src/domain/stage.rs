//! The pipeline state machine: stages and the transitions between them.

use serde::{Deserialize, Serialize};

/// Position of a run in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Run exists, nothing generated yet
    Created,

    /// Both Terraform plans generated and written to the artifact store
    PlansGenerated,

    /// Both plans summarized
    PlansSummarized,

    /// Cost estimator has run against both persisted plans
    CostsEstimated,

    /// Both raw cost breakdowns summarized
    CostsSummarized,

    /// Cross-provider comparison produced
    Compared,

    /// Final synthesis produced (terminal)
    Complete,

    /// The last attempted transition failed (terminal until retried)
    Failed,
}

impl Stage {
    /// The transition that leaves this stage, if any
    pub fn next_transition(&self) -> Option<Transition> {
        match self {
            Stage::Created => Some(Transition::GeneratePlans),
            Stage::PlansGenerated => Some(Transition::SummarizePlans),
            Stage::PlansSummarized => Some(Transition::EstimateCosts),
            Stage::CostsEstimated => Some(Transition::SummarizeCosts),
            Stage::CostsSummarized => Some(Transition::CompareCosts),
            Stage::Compared => Some(Transition::SummarizeComparison),
            Stage::Complete | Stage::Failed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::PlansGenerated => "plans_generated",
            Stage::PlansSummarized => "plans_summarized",
            Stage::CostsEstimated => "costs_estimated",
            Stage::CostsSummarized => "costs_summarized",
            Stage::Compared => "compared",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of work moving a run from one stage to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    GeneratePlans,
    SummarizePlans,
    EstimateCosts,
    SummarizeCosts,
    CompareCosts,
    SummarizeComparison,
}

impl Transition {
    /// Stage the run must be at for this transition to run
    pub fn from(&self) -> Stage {
        match self {
            Transition::GeneratePlans => Stage::Created,
            Transition::SummarizePlans => Stage::PlansGenerated,
            Transition::EstimateCosts => Stage::PlansSummarized,
            Transition::SummarizeCosts => Stage::CostsEstimated,
            Transition::CompareCosts => Stage::CostsSummarized,
            Transition::SummarizeComparison => Stage::Compared,
        }
    }

    /// Stage the run reaches when this transition succeeds
    pub fn target(&self) -> Stage {
        match self {
            Transition::GeneratePlans => Stage::PlansGenerated,
            Transition::SummarizePlans => Stage::PlansSummarized,
            Transition::EstimateCosts => Stage::CostsEstimated,
            Transition::SummarizeCosts => Stage::CostsSummarized,
            Transition::CompareCosts => Stage::Compared,
            Transition::SummarizeComparison => Stage::Complete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::GeneratePlans => "generate_plans",
            Transition::SummarizePlans => "summarize_plans",
            Transition::EstimateCosts => "estimate_costs",
            Transition::SummarizeCosts => "summarize_costs",
            Transition::CompareCosts => "compare_costs",
            Transition::SummarizeComparison => "summarize_comparison",
        }
    }

    /// Progress message shown while the transition runs
    pub fn activity(&self) -> &'static str {
        match self {
            Transition::GeneratePlans => "Generating Terraform plans",
            Transition::SummarizePlans => "Analyzing infrastructure",
            Transition::EstimateCosts => "Running cost analysis",
            Transition::SummarizeCosts => "Summarizing cost analysis",
            Transition::CompareCosts => "Comparing providers",
            Transition::SummarizeComparison => "Generating final analysis",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
