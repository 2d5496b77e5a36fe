//! 任务图层：任务/阶段模型、批次校验、依赖图

pub mod builder;
pub mod graph;
pub mod types;

pub use builder::{build_batch, GraphError, TaskBatch, Violation, ViolationRule};
pub use graph::DependencyGraph;
pub use types::{
    phase_id, task_id, AcceptanceCriterion, Phase, PhaseDraft, Task, TaskDraft, TaskType,
};
