//! Hiveplan - 能力路由的并行规划编排系统
//!
//! 模块划分：
//! - **bus**: 消息总线抽象（内存实现 / 主题通配 / 关联请求-应答）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **coordinator**: Scatter/Gather 协调器（扇出决策、分支分发、结果合成）
//! - **graph**: 任务图构建与校验（阶段、依赖环检测、Scope 约束）
//! - **observability**: 日志初始化
//! - **registry**: 能力注册表与后端健康跟踪（熔断器）

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod graph;
pub mod observability;
pub mod registry;
