//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVEPLAN__*` 覆盖
//! （双下划线表示嵌套，如 `HIVEPLAN__COORDINATOR__MAX_BRANCHES=2`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::coordinator::CoordinatorConfig;
use crate::registry::{HealthConfig, Registry, RoutingConfig};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub coordinator: CoordinatorSection,
    #[serde(default)]
    pub health: HealthSection,
    /// [routing] 段：对默认能力/后端表的覆盖
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [coordinator] 段：扇出上限与回合/请求截止时间
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorSection {
    #[serde(default = "default_max_branches")]
    pub max_branches: usize,
    #[serde(default = "default_round_timeout_secs")]
    pub round_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_branches() -> usize {
    3
}

fn default_round_timeout_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            max_branches: default_max_branches(),
            round_timeout_secs: default_round_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl CoordinatorSection {
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_branches: self.max_branches,
            round_timeout: Duration::from_secs(self.round_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// [health] 段：熔断阈值与恢复窗口
#[derive(Debug, Clone, Deserialize)]
pub struct HealthSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl HealthSection {
    pub fn to_health_config(&self) -> HealthConfig {
        HealthConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
        }
    }
}

impl AppConfig {
    /// 由配置物化注册表：默认表 + [routing] 覆盖 + [health] 参数
    pub fn build_registry(&self) -> Registry {
        let registry = self.routing.build_registry();
        registry.set_health_config(self.health.to_health_config());
        registry
    }
}

/// 从 config 目录加载配置，环境变量 HIVEPLAN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVEPLAN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVEPLAN")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
