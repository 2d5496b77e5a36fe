//! Hiveplan - 能力路由的并行规划编排系统
//!
//! 入口：初始化日志、加载配置、启动焦点工作者，跑一个演示规划回合，
//! 再把合成结果物化为任务批次并按拓扑序打印。

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hiveplan::bus::{subjects, InMemoryBus};
use hiveplan::config::load_config;
use hiveplan::coordinator::{
    ComplexityFanout, ContextSlice, FocusWorker, MockGenerator, PlanCoordinator, RoundInput,
    StaticContextSource,
};
use hiveplan::graph::{build_batch, PhaseDraft, TaskDraft, TaskType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hiveplan::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let registry = Arc::new(cfg.build_registry());
    for issue in registry.validate() {
        warn!(%issue, "routing configuration issue");
    }

    let bus = Arc::new(InMemoryBus::new());
    let generator = MockGenerator::new();
    let cancel = CancellationToken::new();

    // 后台焦点工作者：消费焦点请求，沿回退链调用生成器
    let worker = FocusWorker::new(bus.clone(), Arc::clone(&registry), generator);
    worker
        .spawn(subjects::FOCUS_REQUEST, cancel.child_token())
        .await
        .context("Failed to start focus worker")?;

    let context_source = Arc::new(StaticContextSource {
        context: ContextSlice {
            entities: vec!["Note".into(), "SearchIndex".into()],
            files: vec![
                "api/routes.rs".into(),
                "api/handlers/search.rs".into(),
                "store/index.rs".into(),
                "store/db.rs".into(),
            ],
            summary: "A notes service with a REST API and an embedded store".into(),
        },
    });

    let coordinator = PlanCoordinator::new(
        bus.clone(),
        Arc::clone(&registry),
        context_source,
        Arc::new(ComplexityFanout),
        cfg.coordinator.to_coordinator_config(),
    );

    let report = coordinator
        .run_round(
            RoundInput {
                slug: "add-search".into(),
                title: "Add full-text search".into(),
                goal_seed: "let users search across all notes".into(),
                ..Default::default()
            },
            &cancel,
        )
        .await
        .context("Planning round failed")?;

    info!(
        round_id = %report.round_id,
        dispatched = report.dispatched,
        omissions = ?report.omissions,
        "planning round completed"
    );
    println!("{}", serde_json::to_string_pretty(&report.plan)?);

    // 把合成计划物化为任务批次
    let phases = vec![
        PhaseDraft {
            sequence: 1,
            name: "Phase 1: Foundation".into(),
            description: "Index plumbing and storage".into(),
            depends_on: vec![],
            approval_required: false,
        },
        PhaseDraft {
            sequence: 2,
            name: "Phase 2: API".into(),
            description: "Expose search over the REST surface".into(),
            depends_on: vec![1],
            approval_required: true,
        },
    ];
    let drafts = vec![
        TaskDraft {
            description: "Build the search index over notes".into(),
            task_type: TaskType::Implement,
            phase: Some(1),
            files: vec!["store/index.rs".into()],
            ..Default::default()
        },
        TaskDraft {
            description: "Add the search endpoint".into(),
            task_type: TaskType::Implement,
            phase: Some(2),
            depends_on: vec![1],
            files: vec!["api/handlers/search.rs".into(), "api/routes.rs".into()],
            ..Default::default()
        },
        TaskDraft {
            description: "Integration tests for search".into(),
            task_type: TaskType::Test,
            phase: Some(2),
            depends_on: vec![2],
            ..Default::default()
        },
    ];
    let batch = build_batch("add-search", &report.plan.scope, &phases, &drafts)
        .context("Task batch rejected")?;

    if let Some(order) = batch.dependency_graph().topological_order() {
        println!("execution order: {}", order.join(" -> "));
    }

    for (name, snapshot) in registry.health_snapshot_all() {
        info!(
            backend = %name,
            available = snapshot.available,
            failures = snapshot.failure_count,
            "backend health"
        );
    }

    cancel.cancel();
    Ok(())
}
