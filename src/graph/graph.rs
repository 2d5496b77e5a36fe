//! 任务依赖图：就绪查询、完成推进、拓扑排序
//!
//! 环检测用 Kahn 算法：反复摘除入度为零的节点，摘不完说明有环。

use std::collections::{HashMap, HashSet};

use super::types::Task;

/// 以任务 ID 为节点的依赖图
pub struct DependencyGraph {
    /// 插入顺序，保证遍历确定性
    order: Vec<String>,
    /// 依赖 → 依赖它的任务
    dependents: HashMap<String, Vec<String>>,
    /// 未满足的依赖数
    in_degree: HashMap<String, usize>,
    completed: HashSet<String>,
}

impl DependencyGraph {
    /// 由一个任务批次构建。假定依赖引用已经过批次校验。
    pub fn new(tasks: &[Task]) -> Self {
        let mut order = Vec::with_capacity(tasks.len());
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut in_degree: HashMap<String, usize> = HashMap::new();

        for task in tasks {
            order.push(task.id.clone());
            in_degree.insert(task.id.clone(), task.depends_on.len());
            for dep in &task.depends_on {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }

        Self {
            order,
            dependents,
            in_degree,
            completed: HashSet::new(),
        }
    }

    /// 所有依赖已满足且尚未完成的任务
    pub fn ready_tasks(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| !self.completed.contains(*id) && self.in_degree[*id] == 0)
            .cloned()
            .collect()
    }

    /// 标记完成并释放下游任务
    pub fn mark_completed(&mut self, id: &str) {
        if !self.completed.insert(id.to_string()) {
            return;
        }
        if let Some(downstream) = self.dependents.get(id) {
            for dependent in downstream.clone() {
                if let Some(degree) = self.in_degree.get_mut(&dependent) {
                    *degree = degree.saturating_sub(1);
                }
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed.len() == self.order.len()
    }

    /// 拓扑序；有环时返回 None
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut degree = self.in_degree.clone();
        let mut queue: Vec<String> = self
            .order
            .iter()
            .filter(|id| degree[*id] == 0)
            .cloned()
            .collect();
        let mut sorted = Vec::with_capacity(self.order.len());
        let mut head = 0;

        while head < queue.len() {
            let id = queue[head].clone();
            head += 1;
            sorted.push(id.clone());
            if let Some(downstream) = self.dependents.get(&id) {
                for dependent in downstream {
                    let d = degree.get_mut(dependent)?;
                    *d -= 1;
                    if *d == 0 {
                        queue.push(dependent.clone());
                    }
                }
            }
        }

        if sorted.len() == self.order.len() {
            Some(sorted)
        } else {
            None
        }
    }

    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{task_id, TaskType};

    fn task(slug: &str, seq: usize, deps: &[usize]) -> Task {
        Task {
            id: task_id(slug, seq),
            sequence: seq,
            description: format!("task {seq}"),
            task_type: TaskType::Implement,
            phase_id: None,
            depends_on: deps.iter().map(|d| task_id(slug, *d)).collect(),
            acceptance_criteria: vec![],
            files: vec![],
        }
    }

    #[test]
    fn test_ready_tasks_and_completion() {
        let tasks = vec![task("p", 1, &[]), task("p", 2, &[1]), task("p", 3, &[1, 2])];
        let mut graph = DependencyGraph::new(&tasks);

        assert_eq!(graph.ready_tasks(), vec![task_id("p", 1)]);

        graph.mark_completed(&task_id("p", 1));
        assert_eq!(graph.ready_tasks(), vec![task_id("p", 2)]);

        graph.mark_completed(&task_id("p", 2));
        assert_eq!(graph.ready_tasks(), vec![task_id("p", 3)]);

        graph.mark_completed(&task_id("p", 3));
        assert!(graph.is_done());
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let tasks = vec![task("p", 1, &[2]), task("p", 2, &[]), task("p", 3, &[1])];
        let graph = DependencyGraph::new(&tasks);
        let order = graph.topological_order().unwrap();

        let pos = |seq: usize| order.iter().position(|id| *id == task_id("p", seq)).unwrap();
        assert!(pos(2) < pos(1));
        assert!(pos(1) < pos(3));
    }

    #[test]
    fn test_cycle_detected() {
        let tasks = vec![task("p", 1, &[]), task("p", 2, &[3]), task("p", 3, &[2])];
        let graph = DependencyGraph::new(&tasks);
        assert!(!graph.is_acyclic());
        assert!(graph.topological_order().is_none());
    }

    #[test]
    fn test_duplicate_completion_is_idempotent() {
        let tasks = vec![task("p", 1, &[]), task("p", 2, &[1])];
        let mut graph = DependencyGraph::new(&tasks);
        graph.mark_completed(&task_id("p", 1));
        graph.mark_completed(&task_id("p", 1));
        assert_eq!(graph.ready_tasks(), vec![task_id("p", 2)]);
    }
}
