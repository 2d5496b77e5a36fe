//! 后端健康跟踪（熔断器）
//!
//! 每个后端一条记录：连续失败计数、熔断开关、开启时间戳。状态机为
//! closed → open（失败达阈值）→ half-open（恢复超时已过，放行一次探测）→
//! closed（探测成功）或继续 open（探测失败）。
//!
//! 可用性检查是纯读取，绝不改变状态；只有 record_success / record_failure
//! 会迁移熔断状态，避免并发探测之间的竞争。

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 健康跟踪配置
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// 连续失败多少次后熔断
    pub failure_threshold: u32,
    /// 熔断后多久允许一次探测请求
    pub recovery_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// 单个后端的健康记录（惰性创建：首次上报结果时才建立）
#[derive(Debug, Clone)]
pub struct BackendHealth {
    pub available: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub circuit_open: bool,
    /// 熔断开启时刻（单调时钟，用于恢复窗口计算）
    pub circuit_opened_at: Option<Instant>,
}

impl BackendHealth {
    fn new() -> Self {
        Self {
            available: true,
            last_success: None,
            last_failure: None,
            failure_count: 0,
            circuit_open: false,
            circuit_opened_at: None,
        }
    }
}

/// 对外可序列化的健康快照（运维可见性）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub circuit_open: bool,
}

impl From<&BackendHealth> for HealthSnapshot {
    fn from(h: &BackendHealth) -> Self {
        Self {
            available: h.available,
            last_success: h.last_success,
            last_failure: h.last_failure,
            failure_count: h.failure_count,
            circuit_open: h.circuit_open,
        }
    }
}

/// 健康跟踪器：多读单写，写只发生在结果上报时
#[derive(Debug)]
pub struct HealthTracker {
    config: RwLock<HealthConfig>,
    statuses: RwLock<HashMap<String, BackendHealth>>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config: RwLock::new(config),
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// 上报一次成功：清零失败计数、关闭熔断、恢复可用
    pub fn record_success(&self, name: &str) {
        let mut statuses = self.statuses.write().unwrap();
        let status = statuses
            .entry(name.to_string())
            .or_insert_with(BackendHealth::new);

        status.last_success = Some(Utc::now());
        status.failure_count = 0;
        status.available = true;
        status.circuit_open = false;
        status.circuit_opened_at = None;
    }

    /// 上报一次失败：累加计数，达到阈值即熔断并记录开启时刻
    pub fn record_failure(&self, name: &str) {
        let threshold = self.config.read().unwrap().failure_threshold;

        let mut statuses = self.statuses.write().unwrap();
        let status = statuses
            .entry(name.to_string())
            .or_insert_with(BackendHealth::new);

        status.last_failure = Some(Utc::now());
        status.failure_count += 1;

        if status.failure_count >= threshold {
            status.circuit_open = true;
            status.circuit_opened_at = Some(Instant::now());
            status.available = false;
        }
    }

    /// 后端当前是否可路由。纯读取，不迁移状态。
    ///
    /// 从未上报过 = 可用；熔断关闭 = 可用；熔断开启时，仅当距开启时刻
    /// 超过恢复超时才放行（half-open 探测窗口，开关本身不在此清除）。
    pub fn is_available(&self, name: &str) -> bool {
        self.is_available_at(name, Instant::now())
    }

    /// 以给定时刻评估可用性（供测试做恢复窗口的边界断言）
    pub fn is_available_at(&self, name: &str, now: Instant) -> bool {
        let recovery_timeout = self.config.read().unwrap().recovery_timeout;

        let statuses = self.statuses.read().unwrap();
        let Some(status) = statuses.get(name) else {
            return true;
        };

        if !status.circuit_open {
            return true;
        }

        match status.circuit_opened_at {
            Some(opened_at) => now.saturating_duration_since(opened_at) > recovery_timeout,
            None => true,
        }
    }

    /// 单个后端的健康快照；从未上报过则返回 None
    pub fn snapshot(&self, name: &str) -> Option<HealthSnapshot> {
        self.statuses
            .read()
            .unwrap()
            .get(name)
            .map(HealthSnapshot::from)
    }

    /// 全量健康快照
    pub fn snapshot_all(&self) -> HashMap<String, HealthSnapshot> {
        self.statuses
            .read()
            .unwrap()
            .iter()
            .map(|(name, h)| (name.clone(), HealthSnapshot::from(h)))
            .collect()
    }

    /// 清除某后端的健康记录（等价于回到「从未上报」状态）
    pub fn reset(&self, name: &str) {
        self.statuses.write().unwrap().remove(name);
    }

    /// 运行时替换配置，仅影响后续评估
    pub fn set_config(&self, config: HealthConfig) {
        *self.config.write().unwrap() = config;
    }

    pub fn config(&self) -> HealthConfig {
        self.config.read().unwrap().clone()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
