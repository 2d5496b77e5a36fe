//! 规划回合的数据类型
//!
//! 一个回合内的分支结果（PlanFocusResult）只活到合成完成；
//! 合成产物（SynthesizedPlan）交给任务图构建器与外部存储。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 范围：三组路径模式
///
/// do_not_touch 为硬保护，任何任务的文件列表都不得与之相交。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub do_not_touch: Vec<String>,
}

/// 按路径段判断 prefix 是否覆盖 path
///
/// `src/legacy` 覆盖 `src/legacy/init.go` 与自身，但不覆盖 `src/legacy2`。
pub fn path_covers(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// 一个规划焦点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusArea {
    pub area: String,
    pub description: String,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl FocusArea {
    pub fn general() -> Self {
        Self {
            area: "general".to_string(),
            description: "General analysis of the task".to_string(),
            hints: Vec::new(),
        }
    }
}

/// 分支上下文切片：实体引用、文件列表、简短摘要
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSlice {
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// 发给焦点工作者的请求载荷
///
/// backends 是派发时解析好的回退链，工作者按序尝试。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusRequest {
    pub slug: String,
    pub title: String,
    pub goal_seed: String,
    pub focus: FocusArea,
    pub context: ContextSlice,
    pub backends: Vec<String>,
}

/// 单个分支的产出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFocusResult {
    pub focus_area: String,
    pub goal: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub scope: Scope,
}

/// 分支应答：成功产出或带原因的失败
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FocusOutcome {
    Ok { result: PlanFocusResult },
    Err { message: String },
}

/// 合成后的统一计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedPlan {
    pub goal: String,
    pub context: String,
    pub scope: Scope,
}

/// 回合状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Dispatching,
    AwaitingResults,
    Synthesizing,
}

/// 单个分支的跟踪状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchState {
    pub focus_area: String,
    pub status: BranchStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BranchStatus {
    Dispatched,
    Completed,
    Failed { error: String },
}

/// 活动回合的会话记录（可查询，回合结束即移除）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSession {
    pub round_id: String,
    pub slug: String,
    pub state: RoundState,
    pub branches: HashMap<String, BranchState>,
    pub started_at: DateTime<Utc>,
}

/// 回合输入（来自命令层）
#[derive(Debug, Clone, Default)]
pub struct RoundInput {
    pub slug: String,
    pub title: String,
    pub goal_seed: String,
    /// 显式焦点覆盖；非空时跳过扇出策略
    pub explicit_focuses: Vec<FocusArea>,
    /// 强制单分支模式
    pub force_single: bool,
}

/// 成功回合的报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    pub round_id: String,
    pub slug: String,
    pub plan: SynthesizedPlan,
    /// 派发的分支数
    pub dispatched: usize,
    /// 未能参与合成的焦点（超时或失败），不静默隐藏
    pub omissions: Vec<String>,
}
