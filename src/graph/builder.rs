//! 任务批次构建与校验
//!
//! 校验是全有或全无：收集所有违规后整批拒绝，绝不接受部分任务集，
//! 因为下游执行假定图内部自洽。拒绝时逐条报告哪个任务、哪条规则、
//! 哪个值出了问题，便于调用方重新生成而非修补。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::types::{path_covers, Scope};

use super::graph::DependencyGraph;
use super::types::{phase_id, task_id, Phase, PhaseDraft, Task, TaskDraft};

/// 使用阶段分解时允许的阶段数
pub const MIN_PHASES: usize = 2;
pub const MAX_PHASES: usize = 7;

/// 一条校验违规：哪个任务、哪条规则、哪个值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// 违规的任务 ID；批次级问题用 "batch"
    pub task: String,
    pub rule: ViolationRule,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationRule {
    /// depends_on 引用了批次内不存在的序号
    DanglingDependency,
    /// 依赖构成环
    DependencyCycle,
    /// 文件命中 do_not_touch
    ProtectedPath,
    /// 文件不在 include 范围内
    OutOfScope,
    /// 阶段数不在允许区间
    PhaseCount,
    /// 阶段序号不连续或不从 1 开始
    PhaseSequence,
    /// 阶段前置引用不存在或不早于自身
    PhasePrerequisite,
    /// 任务引用了不存在的阶段
    UnknownPhase,
    /// 使用阶段时任务缺少阶段归属
    MissingPhase,
}

impl std::fmt::Display for ViolationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViolationRule::DanglingDependency => "dangling_dependency",
            ViolationRule::DependencyCycle => "dependency_cycle",
            ViolationRule::ProtectedPath => "protected_path",
            ViolationRule::OutOfScope => "out_of_scope",
            ViolationRule::PhaseCount => "phase_count",
            ViolationRule::PhaseSequence => "phase_sequence",
            ViolationRule::PhasePrerequisite => "phase_prerequisite",
            ViolationRule::UnknownPhase => "unknown_phase",
            ViolationRule::MissingPhase => "missing_phase",
        };
        f.write_str(name)
    }
}

/// 构建错误
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task batch rejected with {} violation(s)", violations.len())]
    Rejected { violations: Vec<Violation> },

    #[error("task batch is empty")]
    EmptyBatch,
}

/// 校验通过的任务批次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBatch {
    pub slug: String,
    pub phases: Vec<Phase>,
    pub tasks: Vec<Task>,
}

impl TaskBatch {
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::new(&self.tasks)
    }
}

/// 把草稿批次校验并物化为任务批次
///
/// phases 为空表示不使用阶段分解。任一违规导致整批拒绝。
pub fn build_batch(
    slug: &str,
    scope: &Scope,
    phase_drafts: &[PhaseDraft],
    task_drafts: &[TaskDraft],
) -> Result<TaskBatch, GraphError> {
    if task_drafts.is_empty() {
        return Err(GraphError::EmptyBatch);
    }

    let mut violations = Vec::new();

    let phases = check_phases(slug, phase_drafts, &mut violations);
    let tasks = materialize_tasks(slug, phase_drafts, task_drafts, &mut violations);
    check_scope(scope, &tasks, &mut violations);
    check_cycles(&tasks, &mut violations);

    if violations.is_empty() {
        Ok(TaskBatch {
            slug: slug.to_string(),
            phases,
            tasks,
        })
    } else {
        Err(GraphError::Rejected { violations })
    }
}

fn check_phases(slug: &str, drafts: &[PhaseDraft], violations: &mut Vec<Violation>) -> Vec<Phase> {
    if drafts.is_empty() {
        return Vec::new();
    }

    if drafts.len() < MIN_PHASES || drafts.len() > MAX_PHASES {
        violations.push(Violation {
            task: "batch".to_string(),
            rule: ViolationRule::PhaseCount,
            value: drafts.len().to_string(),
        });
    }

    let mut sequences: Vec<usize> = drafts.iter().map(|p| p.sequence).collect();
    sequences.sort_unstable();
    for (i, seq) in sequences.iter().enumerate() {
        if *seq != i + 1 {
            violations.push(Violation {
                task: "batch".to_string(),
                rule: ViolationRule::PhaseSequence,
                value: seq.to_string(),
            });
            break;
        }
    }

    let known: HashSet<usize> = drafts.iter().map(|p| p.sequence).collect();
    for draft in drafts {
        for dep in &draft.depends_on {
            if !known.contains(dep) || *dep >= draft.sequence {
                violations.push(Violation {
                    task: phase_id(slug, draft.sequence),
                    rule: ViolationRule::PhasePrerequisite,
                    value: dep.to_string(),
                });
            }
        }
    }

    drafts
        .iter()
        .map(|d| Phase {
            id: phase_id(slug, d.sequence),
            sequence: d.sequence,
            name: d.name.clone(),
            description: d.description.clone(),
            depends_on: d.depends_on.clone(),
            approval_required: d.approval_required,
        })
        .collect()
}

fn materialize_tasks(
    slug: &str,
    phase_drafts: &[PhaseDraft],
    task_drafts: &[TaskDraft],
    violations: &mut Vec<Violation>,
) -> Vec<Task> {
    let total = task_drafts.len();
    let phase_seqs: HashSet<usize> = phase_drafts.iter().map(|p| p.sequence).collect();
    let phases_in_use = !phase_drafts.is_empty();

    task_drafts
        .iter()
        .enumerate()
        .map(|(i, draft)| {
            let seq = i + 1;
            let id = task_id(slug, seq);

            for dep in &draft.depends_on {
                if *dep == 0 || *dep > total || *dep == seq {
                    violations.push(Violation {
                        task: id.clone(),
                        rule: ViolationRule::DanglingDependency,
                        value: dep.to_string(),
                    });
                }
            }

            let phase = if phases_in_use {
                match draft.phase {
                    Some(p) if phase_seqs.contains(&p) => Some(phase_id(slug, p)),
                    Some(p) => {
                        violations.push(Violation {
                            task: id.clone(),
                            rule: ViolationRule::UnknownPhase,
                            value: p.to_string(),
                        });
                        None
                    }
                    None => {
                        violations.push(Violation {
                            task: id.clone(),
                            rule: ViolationRule::MissingPhase,
                            value: String::new(),
                        });
                        None
                    }
                }
            } else {
                None
            };

            Task {
                id,
                sequence: seq,
                description: draft.description.clone(),
                task_type: draft.task_type,
                phase_id: phase,
                depends_on: draft
                    .depends_on
                    .iter()
                    .filter(|d| **d >= 1 && **d <= total)
                    .map(|d| task_id(slug, *d))
                    .collect(),
                acceptance_criteria: draft.acceptance_criteria.clone(),
                files: draft.files.clone(),
            }
        })
        .collect()
}

fn check_scope(scope: &Scope, tasks: &[Task], violations: &mut Vec<Violation>) {
    for task in tasks {
        for file in &task.files {
            // 保护集优先于 include，命中即违规
            if scope.do_not_touch.iter().any(|p| path_covers(p, file)) {
                violations.push(Violation {
                    task: task.id.clone(),
                    rule: ViolationRule::ProtectedPath,
                    value: file.clone(),
                });
                continue;
            }
            if !scope.include.is_empty()
                && !scope.include.iter().any(|p| path_covers(p, file))
            {
                violations.push(Violation {
                    task: task.id.clone(),
                    rule: ViolationRule::OutOfScope,
                    value: file.clone(),
                });
            }
        }
    }
}

fn check_cycles(tasks: &[Task], violations: &mut Vec<Violation>) {
    // 悬空依赖已单独报告，这里只看环
    if violations
        .iter()
        .any(|v| v.rule == ViolationRule::DanglingDependency)
    {
        return;
    }
    let graph = DependencyGraph::new(tasks);
    if !graph.is_acyclic() {
        violations.push(Violation {
            task: "batch".to_string(),
            rule: ViolationRule::DependencyCycle,
            value: "dependency graph contains a cycle".to_string(),
        });
    }
}
