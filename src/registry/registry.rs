//! 能力注册表：能力 → 有序后端偏好 + 回退链
//!
//! 解析规则：resolve 取首选列表第一项，未知能力退化到全局默认而非报错；
//! 回退链 = 首选 ++ 回退（保留重复项，去重交给调用方）。
//! 结合健康跟踪可得「按健康过滤的回退链」，全部不可用时 fail-open 返回原链。

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::capability::Capability;
use super::health::{HealthConfig, HealthSnapshot, HealthTracker};

/// 单个可调用后端的描述：提供方 + 模型标识 + 可选地址 + 输入上限
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// 提供方标签（anthropic / ollama / openai ...）
    pub provider: String,
    /// API 地址（非默认提供方时使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 发给提供方的实际模型标识
    pub model: String,
    /// 最大输入 token 数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// 某能力的后端偏好：有序首选列表 + 有序回退列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityPreference {
    /// 该能力的用途说明
    #[serde(default)]
    pub description: String,
    /// 首选后端名，按优先级排列
    #[serde(default)]
    pub preferred: Vec<String>,
    /// 首选全部失败后的备选
    #[serde(default)]
    pub fallback: Vec<String>,
}

/// 配置校验发现的问题。validate() 收集全部问题而非遇错即停。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    #[error("capability {capability} references unknown backend {backend} in {list}")]
    UnknownBackend {
        capability: Capability,
        backend: String,
        list: &'static str,
    },
    #[error("default backend {0} is not registered")]
    UnknownDefault(String),
}

struct RegistryInner {
    capabilities: HashMap<Capability, CapabilityPreference>,
    backends: HashMap<String, BackendDescriptor>,
    default_backend: String,
}

/// 能力注册表。偏好表与后端表多读单写；写操作整条替换，
/// 读者不会观察到写了一半的列表。
pub struct Registry {
    inner: RwLock<RegistryInner>,
    health: HealthTracker,
}

impl Registry {
    pub fn new(
        capabilities: HashMap<Capability, CapabilityPreference>,
        backends: HashMap<String, BackendDescriptor>,
        default_backend: impl Into<String>,
    ) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                capabilities,
                backends,
                default_backend: default_backend.into(),
            }),
            health: HealthTracker::default(),
        }
    }

    /// 未提供配置时的注册表：Anthropic 系模型为首选，本地 ollama 兜底
    pub fn with_defaults() -> Self {
        let mut capabilities = HashMap::new();
        capabilities.insert(
            Capability::Planning,
            CapabilityPreference {
                description: "High-level reasoning, architecture decisions".into(),
                preferred: vec!["claude-opus".into(), "claude-sonnet".into()],
                fallback: vec!["qwen".into(), "llama3.2".into()],
            },
        );
        capabilities.insert(
            Capability::Writing,
            CapabilityPreference {
                description: "Documentation, proposals, specifications".into(),
                preferred: vec!["claude-sonnet".into()],
                fallback: vec!["claude-haiku".into(), "qwen".into()],
            },
        );
        capabilities.insert(
            Capability::Coding,
            CapabilityPreference {
                description: "Code generation, implementation".into(),
                preferred: vec!["claude-sonnet".into()],
                fallback: vec!["codellama".into(), "qwen".into()],
            },
        );
        capabilities.insert(
            Capability::Reviewing,
            CapabilityPreference {
                description: "Code review, quality analysis".into(),
                preferred: vec!["claude-sonnet".into()],
                fallback: vec!["claude-haiku".into(), "qwen".into()],
            },
        );
        capabilities.insert(
            Capability::Fast,
            CapabilityPreference {
                description: "Quick responses, simple tasks".into(),
                preferred: vec!["claude-haiku".into()],
                fallback: vec!["qwen".into()],
            },
        );

        let ollama = |model: &str, max_tokens: u32| BackendDescriptor {
            provider: "ollama".into(),
            url: Some("http://localhost:11434/v1".into()),
            model: model.into(),
            max_tokens: Some(max_tokens),
        };
        let anthropic = |model: &str| BackendDescriptor {
            provider: "anthropic".into(),
            url: None,
            model: model.into(),
            max_tokens: Some(200_000),
        };

        let mut backends = HashMap::new();
        backends.insert("claude-opus".into(), anthropic("claude-opus-4"));
        backends.insert("claude-sonnet".into(), anthropic("claude-sonnet-4"));
        backends.insert("claude-haiku".into(), anthropic("claude-haiku-3-5"));
        backends.insert("qwen".into(), ollama("qwen2.5-coder:14b", 128_000));
        backends.insert("llama3.2".into(), ollama("llama3.2", 128_000));
        backends.insert("codellama".into(), ollama("codellama", 16_384));

        Self::new(capabilities, backends, "qwen")
    }

    /// 解析能力为后端名：首选列表第一项；未知能力退化到默认。永不失败。
    pub fn resolve(&self, cap: &Capability) -> String {
        let inner = self.inner.read().unwrap();
        if let Some(pref) = inner.capabilities.get(cap) {
            if let Some(first) = pref.preferred.first() {
                return first.clone();
            }
        }
        inner.default_backend.clone()
    }

    /// 完整回退链：首选 ++ 回退，保序且保留重复项；未知能力 → [默认]
    pub fn fallback_chain(&self, cap: &Capability) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        match inner.capabilities.get(cap) {
            Some(pref) => {
                let mut chain = Vec::with_capacity(pref.preferred.len() + pref.fallback.len());
                chain.extend(pref.preferred.iter().cloned());
                chain.extend(pref.fallback.iter().cloned());
                chain
            }
            None => vec![inner.default_backend.clone()],
        }
    }

    /// 按当前健康过滤的回退链。全部被熔断时 fail-open 返回未过滤的原链：
    /// 健康状态可能已过期，尝试一个「不健康」的后端好过什么都不返回。
    pub fn available_fallback_chain(&self, cap: &Capability) -> Vec<String> {
        let chain = self.fallback_chain(cap);
        let available: Vec<String> = chain
            .iter()
            .filter(|name| self.health.is_available(name))
            .cloned()
            .collect();

        if available.is_empty() {
            return chain;
        }
        available
    }

    /// 校验所有偏好/回退/默认引用都指向已注册后端；收集全部问题
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let inner = self.inner.read().unwrap();
        let mut issues = Vec::new();

        for (cap, pref) in &inner.capabilities {
            for name in &pref.preferred {
                if !inner.backends.contains_key(name) {
                    issues.push(ConfigIssue::UnknownBackend {
                        capability: cap.clone(),
                        backend: name.clone(),
                        list: "preferred",
                    });
                }
            }
            for name in &pref.fallback {
                if !inner.backends.contains_key(name) {
                    issues.push(ConfigIssue::UnknownBackend {
                        capability: cap.clone(),
                        backend: name.clone(),
                        list: "fallback",
                    });
                }
            }
        }

        if !inner.backends.contains_key(&inner.default_backend) {
            issues.push(ConfigIssue::UnknownDefault(inner.default_backend.clone()));
        }

        issues
    }

    /// 整条替换某能力的偏好配置
    pub fn set_capability(&self, cap: Capability, pref: CapabilityPreference) {
        self.inner.write().unwrap().capabilities.insert(cap, pref);
    }

    /// 注册或整条替换一个后端描述
    pub fn set_backend(&self, name: impl Into<String>, descriptor: BackendDescriptor) {
        self.inner
            .write()
            .unwrap()
            .backends
            .insert(name.into(), descriptor);
    }

    /// 替换全局默认后端名
    pub fn set_default(&self, name: impl Into<String>) {
        self.inner.write().unwrap().default_backend = name.into();
    }

    pub fn default_backend(&self) -> String {
        self.inner.read().unwrap().default_backend.clone()
    }

    /// 查询后端描述（克隆返回，避免借出锁）
    pub fn backend(&self, name: &str) -> Option<BackendDescriptor> {
        self.inner.read().unwrap().backends.get(name).cloned()
    }

    pub fn list_capabilities(&self) -> Vec<Capability> {
        self.inner.read().unwrap().capabilities.keys().cloned().collect()
    }

    pub fn list_backends(&self) -> Vec<String> {
        self.inner.read().unwrap().backends.keys().cloned().collect()
    }

    // --- 健康上报与查询（委托给 HealthTracker）---

    pub fn record_success(&self, name: &str) {
        self.health.record_success(name);
    }

    pub fn record_failure(&self, name: &str) {
        self.health.record_failure(name);
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.health.is_available(name)
    }

    pub fn health_snapshot(&self, name: &str) -> Option<HealthSnapshot> {
        self.health.snapshot(name)
    }

    pub fn health_snapshot_all(&self) -> HashMap<String, HealthSnapshot> {
        self.health.snapshot_all()
    }

    pub fn reset_health(&self, name: &str) {
        self.health.reset(name);
    }

    pub fn set_health_config(&self, config: HealthConfig) {
        self.health.set_config(config);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
