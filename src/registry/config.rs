//! 注册表配置：以字符串能力键描述的偏好/后端表
//!
//! 配置可以增量构建（写入时不校验引用完整性），加载完成后由
//! Registry::validate 做一次显式校验并报告全部问题。
//! 未知能力键解析为 Capability::Custom，不会被静默丢弃。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::capability::Capability;
use super::registry::{BackendDescriptor, CapabilityPreference, Registry};

/// [routing] 段：对默认注册表的覆盖/补充
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// 能力名 → 偏好；键为字符串，未知键保留为自定义能力
    #[serde(default)]
    pub capabilities: HashMap<Capability, CapabilityPreference>,
    /// 后端名 → 描述
    #[serde(default)]
    pub backends: HashMap<String, BackendDescriptor>,
    /// 全局默认后端名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_backend: Option<String>,
}

impl RoutingConfig {
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
            && self.backends.is_empty()
            && self.default_backend.is_none()
    }

    /// 把本配置整条合并进注册表（热合并：整条替换，不做增量修改）
    pub fn merge_into(&self, registry: &Registry) {
        for (name, descriptor) in &self.backends {
            registry.set_backend(name.clone(), descriptor.clone());
        }
        for (cap, pref) in &self.capabilities {
            registry.set_capability(cap.clone(), pref.clone());
        }
        if let Some(default) = &self.default_backend {
            registry.set_default(default.clone());
        }
    }

    /// 从默认注册表出发，叠加本配置，得到进程级注册表
    pub fn build_registry(&self) -> Registry {
        let registry = Registry::with_defaults();
        self.merge_into(&registry);
        registry
    }
}
