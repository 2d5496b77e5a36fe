//! 计划生成器接口与内置 Mock 实现
//!
//! 真实实现对接具体推理后端；Mock 用于演示与测试，可按后端或焦点
//! 注入失败/挂起行为。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::registry::BackendDescriptor;

use super::types::{FocusRequest, PlanFocusResult, Scope};

/// 生成器错误
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("backend {backend} returned unusable output: {reason}")]
    Malformed { backend: String, reason: String },
}

/// 用指定后端为一个焦点生成计划片段
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(
        &self,
        backend: &BackendDescriptor,
        backend_name: &str,
        request: &FocusRequest,
    ) -> Result<PlanFocusResult, GeneratorError>;
}

/// 注入的行为
#[derive(Debug, Clone)]
enum MockBehavior {
    Fail(String),
    /// 永不返回（模拟分支超时）
    Hang,
}

/// 确定性 Mock 生成器
///
/// 默认从请求内容拼出可预测的结果；按后端名注入失败，按焦点名注入挂起。
#[derive(Default)]
pub struct MockGenerator {
    backend_behaviors: Mutex<HashMap<String, MockBehavior>>,
    focus_behaviors: Mutex<HashMap<String, MockBehavior>>,
    calls: Mutex<HashMap<String, u64>>,
    total_calls: AtomicU64,
}

impl MockGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 让指定后端总是失败
    pub fn fail_backend(&self, backend: &str, reason: &str) {
        self.backend_behaviors
            .lock()
            .unwrap()
            .insert(backend.to_string(), MockBehavior::Fail(reason.to_string()));
    }

    /// 让指定焦点的生成永不完成
    pub fn hang_focus(&self, area: &str) {
        self.focus_behaviors
            .lock()
            .unwrap()
            .insert(area.to_string(), MockBehavior::Hang);
    }

    /// 指定后端被调用的次数
    pub fn calls_to(&self, backend: &str) -> u64 {
        self.calls.lock().unwrap().get(backend).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    fn default_result(request: &FocusRequest) -> PlanFocusResult {
        let area = &request.focus.area;
        PlanFocusResult {
            focus_area: area.clone(),
            goal: format!("{}: {}", request.title, request.goal_seed),
            context: request.context.summary.clone(),
            scope: Scope {
                include: if request.focus.hints.is_empty() {
                    request.context.files.clone()
                } else {
                    request.focus.hints.clone()
                },
                exclude: Vec::new(),
                do_not_touch: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl PlanGenerator for MockGenerator {
    async fn generate(
        &self,
        _backend: &BackendDescriptor,
        backend_name: &str,
        request: &FocusRequest,
    ) -> Result<PlanFocusResult, GeneratorError> {
        let focus_behavior = self
            .focus_behaviors
            .lock()
            .unwrap()
            .get(&request.focus.area)
            .cloned();
        if let Some(MockBehavior::Hang) = focus_behavior {
            std::future::pending::<()>().await;
        }

        *self
            .calls
            .lock()
            .unwrap()
            .entry(backend_name.to_string())
            .or_insert(0) += 1;
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let behavior = self
            .backend_behaviors
            .lock()
            .unwrap()
            .get(backend_name)
            .cloned();
        match behavior {
            Some(MockBehavior::Fail(reason)) => Err(GeneratorError::Backend {
                backend: backend_name.to_string(),
                reason,
            }),
            Some(MockBehavior::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(Self::default_result(request)),
        }
    }
}
