//! 散发/聚合规划层：扇出决策、焦点工作者、分支聚合与合成

pub mod coordinator;
pub mod fanout;
pub mod generator;
pub mod synthesis;
pub mod types;
pub mod worker;

pub use coordinator::{
    ContextSource, CoordinatorConfig, PlanCoordinator, RoundError, StaticContextSource,
};
pub use fanout::{ComplexityFanout, FanoutPolicy, MAX_BRANCHES};
pub use generator::{GeneratorError, MockGenerator, PlanGenerator};
pub use types::{
    ContextSlice, FocusArea, FocusOutcome, FocusRequest, PlanFocusResult, RoundInput, RoundReport,
    RoundState, Scope, SynthesizedPlan,
};
pub use worker::FocusWorker;
