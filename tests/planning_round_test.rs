//! 规划回合集成测试

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use hiveplan::bus::{subjects, InMemoryBus};
use hiveplan::coordinator::{
    ComplexityFanout, ContextSlice, CoordinatorConfig, FocusArea, FocusWorker, MockGenerator,
    PlanCoordinator, RoundError, RoundInput, Scope, StaticContextSource,
};
use hiveplan::graph::{build_batch, GraphError, TaskDraft, ViolationRule};
use hiveplan::registry::{
    BackendDescriptor, Capability, CapabilityPreference, Registry,
};

fn backend(model: &str) -> BackendDescriptor {
    BackendDescriptor {
        provider: "test".into(),
        url: None,
        model: model.into(),
        max_tokens: None,
    }
}

/// planning 首选 [A, B]，回退 [C]
fn abc_registry() -> Registry {
    let mut capabilities = HashMap::new();
    capabilities.insert(
        Capability::Planning,
        CapabilityPreference {
            description: String::new(),
            preferred: vec!["A".into(), "B".into()],
            fallback: vec!["C".into()],
        },
    );
    let mut backends = HashMap::new();
    backends.insert("A".to_string(), backend("model-a"));
    backends.insert("B".to_string(), backend("model-b"));
    backends.insert("C".to_string(), backend("model-c"));
    Registry::new(capabilities, backends, "A")
}

#[test]
fn test_fallback_chain_skips_broken_backend_then_fails_open() {
    let registry = abc_registry();

    // A 连续三次失败熔断 → 链变为 [B, C]
    for _ in 0..3 {
        registry.record_failure("A");
    }
    assert_eq!(
        registry.available_fallback_chain(&Capability::Planning),
        vec!["B", "C"]
    );

    // B、C 也全部熔断 → fail-open 返回完整原链
    for _ in 0..3 {
        registry.record_failure("B");
        registry.record_failure("C");
    }
    assert_eq!(
        registry.available_fallback_chain(&Capability::Planning),
        vec!["A", "B", "C"]
    );
}

fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        max_branches: 3,
        round_timeout: Duration::from_millis(300),
        request_timeout: Duration::from_millis(200),
    }
}

struct Harness {
    coordinator: PlanCoordinator,
    generator: Arc<MockGenerator>,
    cancel: CancellationToken,
}

/// 搭一套完整环境：内存总线 + 工作者 + 三个子系统的上下文
async fn harness(registry: Registry) -> Harness {
    let registry = Arc::new(registry);
    let bus = Arc::new(InMemoryBus::new());
    let generator = MockGenerator::new();
    let cancel = CancellationToken::new();

    let worker = FocusWorker::new(bus.clone(), Arc::clone(&registry), generator.clone());
    worker
        .spawn(subjects::FOCUS_REQUEST, cancel.child_token())
        .await
        .unwrap();

    let context_source = Arc::new(StaticContextSource {
        context: ContextSlice {
            entities: vec!["Note".into()],
            files: vec![
                "api/routes.rs".into(),
                "store/db.rs".into(),
                "ui/view.rs".into(),
            ],
            summary: "three subsystems".into(),
        },
    });

    let coordinator = PlanCoordinator::new(
        bus,
        registry,
        context_source,
        Arc::new(ComplexityFanout),
        test_config(),
    );

    Harness {
        coordinator,
        generator,
        cancel,
    }
}

fn input(slug: &str) -> RoundInput {
    RoundInput {
        slug: slug.into(),
        title: "Add search".into(),
        goal_seed: "search across notes".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_three_branch_round_merges_all_focus_areas() {
    let h = harness(abc_registry()).await;

    let report = h
        .coordinator
        .run_round(input("demo"), &h.cancel)
        .await
        .unwrap();

    assert_eq!(report.dispatched, 3);
    assert!(report.omissions.is_empty());
    // 三个焦点都进入合成结果，目标带焦点前缀
    assert!(report.plan.goal.contains("[api]"));
    assert!(report.plan.goal.contains("[store]"));
    assert!(report.plan.goal.contains("[ui]"));
    h.cancel.cancel();
}

#[tokio::test]
async fn test_silent_branch_is_soft_failure_with_noted_omission() {
    let h = harness(abc_registry()).await;
    // 第二个焦点（store）永不应答
    h.generator.hang_focus("store");

    let report = h
        .coordinator
        .run_round(input("demo"), &h.cancel)
        .await
        .unwrap();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.omissions, vec!["store".to_string()]);
    assert!(report.plan.goal.contains("[api]"));
    assert!(report.plan.goal.contains("[ui]"));
    assert!(!report.plan.goal.contains("[store]"));
    h.cancel.cancel();
}

#[tokio::test]
async fn test_all_branches_silent_is_hard_failure() {
    let h = harness(abc_registry()).await;
    h.generator.hang_focus("api");
    h.generator.hang_focus("store");
    h.generator.hang_focus("ui");

    let err = h
        .coordinator
        .run_round(input("demo"), &h.cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, RoundError::TimedOut { .. }));
    h.cancel.cancel();
}

#[tokio::test]
async fn test_all_branches_erroring_is_hard_failure() {
    let h = harness(abc_registry()).await;
    h.generator.fail_backend("A", "down");
    h.generator.fail_backend("B", "down");
    h.generator.fail_backend("C", "down");

    let err = h
        .coordinator
        .run_round(input("demo"), &h.cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, RoundError::AllBranchesFailed { .. }));
    h.cancel.cancel();
}

#[tokio::test]
async fn test_cancelled_round_reports_failure_not_done() {
    let h = harness(abc_registry()).await;
    h.generator.hang_focus("api");
    h.generator.hang_focus("store");
    h.generator.hang_focus("ui");

    let round_cancel = h.cancel.child_token();
    let trigger = round_cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = h
        .coordinator
        .run_round(input("demo"), &round_cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, RoundError::Cancelled { .. }));
    assert!(h.coordinator.active_sessions().is_empty());
    h.cancel.cancel();
}

#[tokio::test]
async fn test_worker_falls_back_when_primary_backend_fails() {
    let h = harness(abc_registry()).await;
    h.generator.fail_backend("A", "connection refused");

    let round = RoundInput {
        force_single: true,
        ..input("demo")
    };
    let report = h.coordinator.run_round(round, &h.cancel).await.unwrap();

    assert_eq!(report.dispatched, 1);
    assert!(report.omissions.is_empty());
    // A 失败后在 B 上成功，健康记录随之更新
    assert_eq!(h.generator.calls_to("A"), 1);
    assert_eq!(h.generator.calls_to("B"), 1);
    h.cancel.cancel();
}

#[tokio::test]
async fn test_explicit_focus_override_controls_fanout() {
    let h = harness(abc_registry()).await;

    let round = RoundInput {
        explicit_focuses: vec![FocusArea {
            area: "security".into(),
            description: "Review auth".into(),
            hints: vec!["api".into()],
        }],
        ..input("demo")
    };
    let report = h.coordinator.run_round(round, &h.cancel).await.unwrap();

    assert_eq!(report.dispatched, 1);
    // 单分支透传，不加焦点前缀
    assert!(!report.plan.goal.contains('['));
    h.cancel.cancel();
}

#[tokio::test]
async fn test_synthesized_scope_feeds_graph_validation() {
    let h = harness(abc_registry()).await;
    let report = h
        .coordinator
        .run_round(input("demo"), &h.cancel)
        .await
        .unwrap();

    // 合成范围 + 保护路径约束下的批次校验
    let scope = Scope {
        include: report.plan.scope.include.clone(),
        exclude: vec![],
        do_not_touch: vec!["store".into()],
    };

    let drafts = vec![TaskDraft {
        description: "touch protected store".into(),
        files: vec!["store/db.rs".into()],
        ..Default::default()
    }];
    let err = build_batch("demo", &scope, &[], &drafts).unwrap_err();
    match err {
        GraphError::Rejected { violations } => {
            assert!(violations
                .iter()
                .any(|v| v.rule == ViolationRule::ProtectedPath));
        }
        other => panic!("unexpected error: {other}"),
    }

    let ok = vec![TaskDraft {
        description: "work in api".into(),
        files: vec!["api/routes.rs".into()],
        ..Default::default()
    }];
    assert!(build_batch("demo", &scope, &[], &ok).is_ok());
    h.cancel.cancel();
}
