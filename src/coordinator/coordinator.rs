//! 散发/聚合协调器
//!
//! 每个回合：决定扇出 → 并行派发焦点请求 → 在一个统一的回合截止时间内
//! 聚合应答 → 合成。单个分支超时/失败是软失败（焦点记为缺失），
//! 零分支成功才是硬失败。取消向所有在途分支传播，回合以失败收场。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{subjects, MessageBus, RequestError, RequestReply};
use crate::registry::{Capability, Registry};

use super::fanout::{choose_focuses, FanoutPolicy};
use super::synthesis;
use super::types::{
    path_covers, BranchState, BranchStatus, ContextSlice, FocusArea, FocusOutcome, FocusRequest,
    PlanFocusResult, PlanSession, RoundInput, RoundReport, RoundState,
};

/// 协调器配置
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// 分支数上限（1–3）
    pub max_branches: usize,
    /// 整个回合的截止时间（所有分支共用，不按分支计）
    pub round_timeout: Duration,
    /// 单次请求/应答的截止时间
    pub request_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_branches: 3,
            round_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// 回合级错误（硬失败）
#[derive(Debug, Error)]
pub enum RoundError {
    #[error("round {round_id} timed out with no branch responses")]
    TimedOut { round_id: String },

    #[error("round {round_id} failed: all {branches} branches failed")]
    AllBranchesFailed { round_id: String, branches: usize },

    #[error("round {round_id} cancelled")]
    Cancelled { round_id: String },
}

/// 上下文服务边界：回合开始前查询一次代码库概览
#[async_trait::async_trait]
pub trait ContextSource: Send + Sync {
    async fn gather(&self, slug: &str, title: &str) -> ContextSlice;
}

/// 固定内容的上下文来源（演示与测试用）
#[derive(Debug, Clone, Default)]
pub struct StaticContextSource {
    pub context: ContextSlice,
}

#[async_trait::async_trait]
impl ContextSource for StaticContextSource {
    async fn gather(&self, _slug: &str, _title: &str) -> ContextSlice {
        self.context.clone()
    }
}

/// 规划回合协调器。多个回合可并发运行（每个计划一个）。
pub struct PlanCoordinator {
    bus: Arc<dyn MessageBus>,
    registry: Arc<Registry>,
    context_source: Arc<dyn ContextSource>,
    fanout: Arc<dyn FanoutPolicy>,
    config: CoordinatorConfig,
    sessions: RwLock<HashMap<String, PlanSession>>,
}

impl PlanCoordinator {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        registry: Arc<Registry>,
        context_source: Arc<dyn ContextSource>,
        fanout: Arc<dyn FanoutPolicy>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            bus,
            registry,
            context_source,
            fanout,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 当前活动回合的会话快照
    pub fn active_sessions(&self) -> Vec<PlanSession> {
        self.sessions.read().unwrap().values().cloned().collect()
    }

    /// 执行一个完整的规划回合
    pub async fn run_round(
        &self,
        input: RoundInput,
        cancel: &CancellationToken,
    ) -> Result<RoundReport, RoundError> {
        let round_id = Uuid::new_v4().to_string();
        info!(round_id, slug = %input.slug, "starting planning round");

        let context = self.context_source.gather(&input.slug, &input.title).await;
        let focuses = choose_focuses(
            self.fanout.as_ref(),
            &input,
            &context,
            self.config.max_branches,
        );
        let chain = self.registry.available_fallback_chain(&Capability::Planning);
        info!(
            round_id,
            branches = focuses.len(),
            chain = ?chain,
            "fan-out decided"
        );

        self.insert_session(&round_id, &input.slug, &focuses);
        let result = self
            .drive_round(&round_id, &input, &context, focuses, chain, cancel)
            .await;
        // 回合结束（无论成败）即移除会话
        self.sessions.write().unwrap().remove(&round_id);
        result
    }

    async fn drive_round(
        &self,
        round_id: &str,
        input: &RoundInput,
        context: &ContextSlice,
        focuses: Vec<FocusArea>,
        chain: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<RoundReport, RoundError> {
        let dispatched = focuses.len();
        let slices = slice_context(context, &focuses);
        let child = cancel.child_token();
        let (tx, mut rx) = mpsc::channel::<(String, Result<FocusOutcome, RequestError>)>(dispatched);

        for (focus, slice) in focuses.iter().cloned().zip(slices) {
            let request = FocusRequest {
                slug: input.slug.clone(),
                title: input.title.clone(),
                goal_seed: input.goal_seed.clone(),
                focus: focus.clone(),
                context: slice,
                backends: chain.clone(),
            };
            let bus = Arc::clone(&self.bus);
            let timeout = self.config.request_timeout;
            let branch_cancel = child.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let client = RequestReply::new(bus, timeout);
                let outcome = client
                    .request::<FocusRequest, FocusOutcome>(
                        subjects::FOCUS_REQUEST,
                        subjects::FOCUS_RESPONSE_PREFIX,
                        request,
                        &branch_cancel,
                    )
                    .await;
                let _ = tx.send((focus.area, outcome)).await;
            });
        }
        drop(tx);
        self.set_state(round_id, RoundState::AwaitingResults);

        let deadline = Instant::now() + self.config.round_timeout;
        let mut results: Vec<PlanFocusResult> = Vec::new();
        // settled 计所有已定案的分支；replied 只计真正送达的应答
        let mut settled = 0usize;
        let mut replied = 0usize;

        loop {
            if settled == dispatched {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    child.cancel();
                    warn!(round_id, "round cancelled by caller");
                    return Err(RoundError::Cancelled { round_id: round_id.to_string() });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(round_id, settled, dispatched, "round deadline reached");
                    break;
                }
                received = rx.recv() => {
                    let Some((area, outcome)) = received else { break };
                    settled += 1;
                    match outcome {
                        Ok(FocusOutcome::Ok { result }) => {
                            replied += 1;
                            self.set_branch(round_id, &area, BranchStatus::Completed);
                            results.push(result);
                        }
                        Ok(FocusOutcome::Err { message }) => {
                            replied += 1;
                            self.set_branch(round_id, &area, BranchStatus::Failed { error: message });
                        }
                        Err(err) => {
                            self.set_branch(
                                round_id,
                                &area,
                                BranchStatus::Failed { error: err.to_string() },
                            );
                        }
                    }
                }
            }
        }
        // 停掉仍在途的分支监听器
        child.cancel();

        if results.is_empty() {
            return Err(if replied == 0 {
                RoundError::TimedOut {
                    round_id: round_id.to_string(),
                }
            } else {
                RoundError::AllBranchesFailed {
                    round_id: round_id.to_string(),
                    branches: dispatched,
                }
            });
        }

        self.set_state(round_id, RoundState::Synthesizing);
        let plan = synthesis::merge(&results);

        let got: Vec<&str> = results.iter().map(|r| r.focus_area.as_str()).collect();
        let omissions: Vec<String> = focuses
            .iter()
            .map(|f| f.area.clone())
            .filter(|area| !got.contains(&area.as_str()))
            .collect();
        if !omissions.is_empty() {
            warn!(round_id, ?omissions, "round completed with missing focus areas");
        }
        info!(round_id, merged = results.len(), "round synthesized");

        Ok(RoundReport {
            round_id: round_id.to_string(),
            slug: input.slug.clone(),
            plan,
            dispatched,
            omissions,
        })
    }

    fn insert_session(&self, round_id: &str, slug: &str, focuses: &[FocusArea]) {
        let now = Utc::now();
        let branches = focuses
            .iter()
            .map(|f| {
                (
                    f.area.clone(),
                    BranchState {
                        focus_area: f.area.clone(),
                        status: BranchStatus::Dispatched,
                        started_at: now,
                        completed_at: None,
                    },
                )
            })
            .collect();
        self.sessions.write().unwrap().insert(
            round_id.to_string(),
            PlanSession {
                round_id: round_id.to_string(),
                slug: slug.to_string(),
                state: RoundState::Dispatching,
                branches,
                started_at: now,
            },
        );
    }

    fn set_state(&self, round_id: &str, state: RoundState) {
        if let Some(session) = self.sessions.write().unwrap().get_mut(round_id) {
            session.state = state;
        }
    }

    fn set_branch(&self, round_id: &str, area: &str, status: BranchStatus) {
        if let Some(session) = self.sessions.write().unwrap().get_mut(round_id) {
            if let Some(branch) = session.branches.get_mut(area) {
                branch.status = status;
                branch.completed_at = Some(Utc::now());
            }
        }
    }
}

/// 把回合上下文切成每分支一份，尽量互不重叠
///
/// 文件分给第一个提示能覆盖它的焦点，无人认领的归第一个分支；
/// 实体与摘要对所有分支共享。
fn slice_context(context: &ContextSlice, focuses: &[FocusArea]) -> Vec<ContextSlice> {
    let mut slices: Vec<ContextSlice> = focuses
        .iter()
        .map(|_| ContextSlice {
            entities: context.entities.clone(),
            files: Vec::new(),
            summary: context.summary.clone(),
        })
        .collect();

    for file in &context.files {
        let owner = focuses
            .iter()
            .position(|f| f.hints.iter().any(|hint| path_covers(hint, file)))
            .unwrap_or(0);
        slices[owner].files.push(file.clone());
    }

    slices
}
