//! 能力注册表层：能力解析、后端回退链、健康跟踪（熔断器）

pub mod capability;
pub mod config;
pub mod health;
pub mod registry;

pub use capability::Capability;
pub use config::RoutingConfig;
pub use health::{BackendHealth, HealthConfig, HealthSnapshot, HealthTracker};
pub use registry::{BackendDescriptor, CapabilityPreference, ConfigIssue, Registry};
