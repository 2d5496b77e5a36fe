//! 任务与阶段的数据模型
//!
//! 任务 ID 形如 `task.{slug}.{seq}`，序号 1 起、在一个批次内连续。
//! 任务批次整体生成、整体替换，不支持单条修补。

use serde::{Deserialize, Serialize};

use crate::registry::Capability;

/// 任务类型，决定执行时路由到哪个能力
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Implement,
    Test,
    Document,
    Review,
    Refactor,
}

impl TaskType {
    /// 执行该类任务所需的能力
    pub fn capability(&self) -> Capability {
        match self {
            TaskType::Implement | TaskType::Test | TaskType::Refactor => Capability::Coding,
            TaskType::Document => Capability::Writing,
            TaskType::Review => Capability::Reviewing,
        }
    }
}

/// BDD 风格的验收标准
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub given: String,
    pub when: String,
    pub then: String,
}

/// 一个原子工作单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub sequence: usize,
    pub description: String,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// 一个计划阶段。阶段序号 1 起且连续，前置引用早于自身的阶段序号。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub sequence: usize,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 前置阶段的序号
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub approval_required: bool,
}

/// 待校验的任务草稿：依赖以 1 起的批内序号表示
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    pub description: String,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    /// 所属阶段的序号（使用阶段时必填）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<usize>,
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// 待校验的阶段草稿
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDraft {
    pub sequence: usize,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub approval_required: bool,
}

/// 任务实体 ID
pub fn task_id(slug: &str, sequence: usize) -> String {
    format!("task.{slug}.{sequence}")
}

/// 阶段实体 ID
pub fn phase_id(slug: &str, sequence: usize) -> String {
    format!("phase.{slug}.{sequence}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_capability_mapping() {
        assert_eq!(TaskType::Implement.capability(), Capability::Coding);
        assert_eq!(TaskType::Test.capability(), Capability::Coding);
        assert_eq!(TaskType::Refactor.capability(), Capability::Coding);
        assert_eq!(TaskType::Document.capability(), Capability::Writing);
        assert_eq!(TaskType::Review.capability(), Capability::Reviewing);
    }

    #[test]
    fn test_entity_id_formats() {
        assert_eq!(task_id("add-search", 3), "task.add-search.3");
        assert_eq!(phase_id("add-search", 1), "phase.add-search.1");
    }

    #[test]
    fn test_task_type_serde_names() {
        assert_eq!(
            serde_json::to_string(&TaskType::Implement).unwrap(),
            r#""implement""#
        );
        let parsed: TaskType = serde_json::from_str(r#""refactor""#).unwrap();
        assert_eq!(parsed, TaskType::Refactor);
    }
}
