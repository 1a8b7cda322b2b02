//! Benchmarks for pipeline building and execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deployflow::actions::FnAction;
use deployflow::approval::ApprovalService;
use deployflow::config::{PipelineConfig, SourceConfig};
use deployflow::context::ActionContext;
use deployflow::core::ActionOutput;
use deployflow::pipeline::{
    standard_pipeline, ActionSpec, Collaborators, Orchestrator, Pipeline, PipelineBuilder,
    SourceEvent, StageSpec,
};
use deployflow::testing::{MockDeployBackend, MockSmokeTestRunner, MockSourceProvider};
use std::sync::Arc;

fn instant_pipeline(stages: usize, actions_per_group: usize) -> Pipeline {
    let mut builder = PipelineBuilder::new("bench");
    for s in 0..stages {
        let mut stage = StageSpec::new(format!("stage-{s}"));
        for run_order in 1..=2u32 {
            for a in 0..actions_per_group {
                let action = FnAction::new(format!("s{s}-r{run_order}-a{a}"), |_ctx: &ActionContext| {
                    ActionOutput::ok()
                });
                stage = stage.with_action(ActionSpec::new(Arc::new(action), run_order));
            }
        }
        builder.add_stage(stage);
    }
    match builder.build() {
        Ok(pipeline) => pipeline,
        Err(e) => panic!("bench pipeline is invalid: {e}"),
    }
}

fn build_benchmark(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let collaborators = Collaborators {
        source: Arc::new(MockSourceProvider::new()),
        deploy: Arc::new(MockDeployBackend::new()),
        smoke: Arc::new(MockSmokeTestRunner::new()),
        approvals: Arc::new(ApprovalService::new()),
    };

    c.bench_function("standard_pipeline", |b| {
        b.iter(|| black_box(standard_pipeline(&config, &collaborators).is_ok()));
    });
    c.bench_function("build_10_stages", |b| {
        b.iter(|| black_box(instant_pipeline(10, 4)));
    });
}

fn run_benchmark(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let orchestrator = Orchestrator::new(instant_pipeline(3, 4), SourceConfig::new("svc", "main"));

    c.bench_function("run_3_stages_24_actions", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let execution = orchestrator
                    .trigger(SourceEvent::push("svc", "main", "abc123"))
                    .await;
                black_box(execution.is_ok())
            })
        });
    });
}

criterion_group!(benches, build_benchmark, run_benchmark);
criterion_main!(benches);
