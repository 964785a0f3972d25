//! Pipeline Engine Integration Tests
//!
//! Tests for stage ordering, resumability, both-or-neither commits,
//! and restart behavior.

mod common;

use common::{Mocks, MockEstimator, MockGenerator, MockSummarizer, AWS_PLAN, AZURE_PLAN, COMPARISON};
use infracompare::domain::StageFailure;
use infracompare::{
    CancelSignal, ErrorKind, Field, FieldView, PipelineError, Provider, SafetyLimits, Stage,
    Transition,
};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_full_run_reaches_complete() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default();
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("A web app with two VMs").await.unwrap();
    assert_eq!(run.stage(), Stage::Created);
    assert_eq!(mocks.calls(), (0, 0, 0, 0));

    let mut progress = Vec::new();
    let stage = engine
        .run_to_completion(&mut run, &CancelSignal::never(), |run| {
            progress.push(run.stage())
        })
        .await
        .unwrap();

    assert_eq!(stage, Stage::Complete);
    assert!(run.is_complete());
    assert_eq!(
        progress,
        vec![
            Stage::PlansGenerated,
            Stage::PlansSummarized,
            Stage::CostsEstimated,
            Stage::CostsSummarized,
            Stage::Compared,
            Stage::Complete,
        ]
    );

    // One generation, 2 + 2 + 1 summaries, one estimate per provider, one comparison
    assert_eq!(mocks.calls(), (1, 5, 2, 1));

    assert_eq!(run.aws_plan(), Some(AWS_PLAN));
    assert_eq!(run.azure_plan(), Some(AZURE_PLAN));
    assert_eq!(
        run.aws_plan_summary(),
        Some(format!("synthesis of: {}", AWS_PLAN).as_str())
    );
    assert!(run.aws_cost_raw().unwrap().contains("totalMonthlyCost"));
    assert!(run.azure_cost_summary().unwrap().starts_with("synthesis of:"));
    assert_eq!(run.comparison_text(), Some(COMPARISON));
    assert_eq!(
        run.final_summary(),
        Some(format!("synthesis of: {}", COMPARISON).as_str())
    );

    for field in Field::ALL {
        assert!(matches!(run.view(field), FieldView::Ready(_)), "{:?}", field);
    }
}

#[tokio::test]
async fn test_advance_performs_one_transition() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default();
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("A static website").await.unwrap();
    let stage = engine.advance(&mut run).await.unwrap();

    assert_eq!(stage, Stage::PlansGenerated);
    assert_eq!(mocks.calls(), (1, 0, 0, 0));
    assert_eq!(run.pending_transition(), Some(Transition::SummarizePlans));
    assert_eq!(run.view(Field::AwsPlanSummary), FieldView::Pending);

    // Plans are persisted where the estimator will look for them
    for provider in Provider::ALL {
        let stored = engine
            .artifacts()
            .read(run.run_id(), provider)
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), run.plan(provider));
    }
}

#[tokio::test]
async fn test_estimator_receives_artifact_locations() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default();
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("A queue and two workers").await.unwrap();
    for _ in 0..3 {
        engine.advance(&mut run).await.unwrap();
    }
    assert_eq!(run.stage(), Stage::CostsEstimated);

    let mut locations = mocks.estimator.locations();
    locations.sort();

    let mut expected: Vec<_> = Provider::ALL
        .iter()
        .map(|p| engine.artifacts().location_of(run.run_id(), *p))
        .collect();
    expected.sort();

    assert_eq!(locations, expected);
}

#[tokio::test]
async fn test_advance_on_complete_is_noop() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default();
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("A cache cluster").await.unwrap();
    engine
        .run_to_completion(&mut run, &CancelSignal::never(), |_| {})
        .await
        .unwrap();

    let before = run.clone();
    let calls = mocks.calls();

    assert_eq!(engine.advance(&mut run).await.unwrap(), Stage::Complete);
    assert_eq!(run, before);
    assert_eq!(mocks.calls(), calls);
}

#[tokio::test]
async fn test_estimation_failure_commits_nothing() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default().with_estimator(MockEstimator::failing_for(Provider::Azure, 1));
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("Kubernetes with three nodes").await.unwrap();
    engine.advance(&mut run).await.unwrap();
    engine.advance(&mut run).await.unwrap();

    let err = engine.advance(&mut run).await.unwrap_err();
    match &err {
        PipelineError::Estimation { provider, .. } => assert_eq!(*provider, Provider::Azure),
        other => panic!("Expected estimation error, got {:?}", other),
    }

    // AWS succeeded but must not be visible without Azure
    assert_eq!(run.stage(), Stage::Failed);
    assert_eq!(run.checkpoint(), Stage::PlansSummarized);
    assert!(run.cost_estimates().is_none());
    assert!(run.aws_cost_raw().is_none());

    let failure: &StageFailure = run.failure().unwrap();
    assert_eq!(failure.transition, Transition::EstimateCosts);
    assert_eq!(failure.kind, ErrorKind::Estimation);
    assert!(failure.message.contains("no valid Terraform files"));

    assert!(matches!(run.view(Field::AwsCostRaw), FieldView::Failed(_)));
    assert!(matches!(run.view(Field::AwsPlan), FieldView::Ready(_)));
    assert_eq!(run.view(Field::ComparisonText), FieldView::Pending);
}

#[tokio::test]
async fn test_retry_resumes_from_checkpoint() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default().with_estimator(MockEstimator::failing_for(Provider::Aws, 1));
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("Postgres with a read replica").await.unwrap();
    let result = engine
        .run_to_completion(&mut run, &CancelSignal::never(), |_| {})
        .await;
    assert_err!(result);
    assert_eq!(run.checkpoint(), Stage::PlansSummarized);

    let (generator_calls, summarizer_calls, _, _) = mocks.calls();
    assert_eq!((generator_calls, summarizer_calls), (1, 2));

    let stage = assert_ok!(
        engine
            .run_to_completion(&mut run, &CancelSignal::never(), |_| {})
            .await
    );
    assert_eq!(stage, Stage::Complete);
    assert!(run.failure().is_none());

    // Earlier stages were not repeated
    let (generator_calls, summarizer_calls, estimator_calls, comparator_calls) = mocks.calls();
    assert_eq!(generator_calls, 1);
    assert_eq!(summarizer_calls, 5);
    assert_eq!(comparator_calls, 1);
    // Failed attempt (up to 2 calls) plus the successful retry
    assert!(estimator_calls >= 3 && estimator_calls <= 4);
}

#[tokio::test]
async fn test_end_to_end_final_summary() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default().with_summarizer(MockSummarizer::returning("synthesis"));
    let engine = common::engine(&mocks, &temp);

    let mut run = engine
        .create_run("A web app with a database and load balancer")
        .await
        .unwrap();
    let stage = engine
        .run_to_completion(&mut run, &CancelSignal::never(), |_| {})
        .await
        .unwrap();

    assert_eq!(stage, Stage::Complete);
    assert_eq!(run.final_summary(), Some("synthesis"));
    assert_eq!(run.aws_plan_summary(), Some("synthesis"));
    assert_eq!(run.comparison_text(), Some(COMPARISON));
    assert_eq!(mocks.calls(), (1, 5, 2, 1));
}

#[tokio::test]
async fn test_single_advance_retry_after_estimation_failure() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default().with_estimator(MockEstimator::failing_for(Provider::Azure, 1));
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("A message queue").await.unwrap();
    engine.advance(&mut run).await.unwrap();
    engine.advance(&mut run).await.unwrap();

    let err = engine.advance(&mut run).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Estimation);
    assert_eq!(run.stage(), Stage::Failed);
    assert!(run.aws_cost_raw().is_none());
    assert!(run.azure_cost_raw().is_none());

    let stage = engine.advance(&mut run).await.unwrap();
    assert_eq!(stage, Stage::CostsEstimated);
    assert_eq!(run.stage(), Stage::CostsEstimated);
    assert!(run.aws_cost_raw().is_some());
    assert!(run.azure_cost_raw().is_some());
    assert!(run.failure().is_none());
}

#[tokio::test]
async fn test_generation_failure_then_retry() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default().with_generator(MockGenerator::failing(1));
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("A serverless API").await.unwrap();

    let err = engine.advance(&mut run).await.unwrap_err();
    assert!(matches!(err, PipelineError::Generation(_)));
    assert!(err.is_retryable());
    assert_eq!(run.stage(), Stage::Failed);
    assert_eq!(run.checkpoint(), Stage::Created);
    assert!(run.plans().is_none());
    assert!(!engine.artifacts().contains_run(run.run_id()));

    assert_eq!(engine.advance(&mut run).await.unwrap(), Stage::PlansGenerated);
    assert!(run.failure().is_none());
    assert_eq!(mocks.calls().0, 2);
}

#[tokio::test]
async fn test_blank_plan_fails_generation() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default().with_generator(MockGenerator::with_empty_azure());
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("An object store").await.unwrap();
    let err = engine.advance(&mut run).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Generation);
    assert!(run.plans().is_none());
    assert!(!engine.artifacts().contains_run(run.run_id()));
}

#[tokio::test]
async fn test_summary_failure_keeps_plans() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default().with_summarizer(MockSummarizer::failing(1));
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("A VPN gateway").await.unwrap();
    engine.advance(&mut run).await.unwrap();

    let err = engine.advance(&mut run).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Summarization);
    assert!(run.plan_summaries().is_none());
    assert_eq!(run.aws_plan(), Some(AWS_PLAN));

    assert_eq!(engine.advance(&mut run).await.unwrap(), Stage::PlansSummarized);
}

#[tokio::test]
async fn test_sequential_providers() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default();
    let limits = SafetyLimits {
        parallel_providers: false,
        ..Default::default()
    };
    let engine = common::engine_with_limits(&mocks, &temp, limits);

    let mut run = engine.create_run("A data warehouse").await.unwrap();
    engine
        .run_to_completion(&mut run, &CancelSignal::never(), |_| {})
        .await
        .unwrap();

    assert_eq!(mocks.calls(), (1, 5, 2, 1));

    let locations = mocks.estimator.locations();
    assert!(locations[0].ends_with("aws"));
    assert!(locations[1].ends_with("azure"));
}

#[tokio::test]
async fn test_restart_clears_outputs() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default();
    let engine = common::engine(&mocks, &temp);

    let mut run = engine.create_run("A message broker").await.unwrap();
    engine
        .run_to_completion(&mut run, &CancelSignal::never(), |_| {})
        .await
        .unwrap();

    let run_id = run.run_id();
    let location = engine.artifacts().location_of(run_id, Provider::Aws);

    engine.restart(&mut run).await.unwrap();

    assert_eq!(run.run_id(), run_id);
    assert_eq!(run.stage(), Stage::Created);
    assert_eq!(run.requirement_text(), "A message broker");
    for field in Field::ALL {
        assert_eq!(run.view(field), FieldView::Pending);
    }
    assert_eq!(engine.artifacts().location_of(run_id, Provider::Aws), location);

    engine
        .run_to_completion(&mut run, &CancelSignal::never(), |_| {})
        .await
        .unwrap();
    assert_eq!(mocks.calls(), (2, 10, 4, 2));
}

#[tokio::test]
async fn test_runs_get_distinct_locations() {
    let temp = TempDir::new().unwrap();
    let mocks = Mocks::default();
    let engine = common::engine(&mocks, &temp);

    let first = engine.create_run("Two VMs").await.unwrap();
    let second = engine.create_run("Two VMs").await.unwrap();

    assert_ne!(first.run_id(), second.run_id());
    assert_ne!(
        engine.artifacts().location_of(first.run_id(), Provider::Aws),
        engine.artifacts().location_of(second.run_id(), Provider::Aws)
    );
}
