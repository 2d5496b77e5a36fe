//! 分支结果合成
//!
//! 合成对收到的结果集合是可交换的：目标/上下文按给定顺序拼接只为可读性，
//! 范围集合并集与顺序无关。单分支时直接透传，不加前缀。

use super::types::{path_covers, PlanFocusResult, Scope, SynthesizedPlan};

/// 合并一组分支结果为统一计划
///
/// 同一路径同时出现在 include 与 do_not_touch 时，保留更严格的归类，
/// 从 include 中移除。
pub fn merge(results: &[PlanFocusResult]) -> SynthesizedPlan {
    if results.len() == 1 {
        let r = &results[0];
        return SynthesizedPlan {
            goal: r.goal.clone(),
            context: r.context.clone(),
            scope: resolve_conflicts(r.scope.clone()),
        };
    }

    let mut goals = Vec::new();
    let mut contexts = Vec::new();
    let mut scope = Scope::default();

    for r in results {
        goals.push(format!("[{}] {}", r.focus_area, r.goal));
        if !r.context.is_empty() {
            contexts.push(format!("[{}] {}", r.focus_area, r.context));
        }
        scope.include.extend(r.scope.include.iter().cloned());
        scope.exclude.extend(r.scope.exclude.iter().cloned());
        scope
            .do_not_touch
            .extend(r.scope.do_not_touch.iter().cloned());
    }

    dedup_preserving_order(&mut scope.include);
    dedup_preserving_order(&mut scope.exclude);
    dedup_preserving_order(&mut scope.do_not_touch);

    SynthesizedPlan {
        goal: goals.join("\n"),
        context: contexts.join("\n"),
        scope: resolve_conflicts(scope),
    }
}

fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

fn resolve_conflicts(mut scope: Scope) -> Scope {
    let protected = scope.do_not_touch.clone();
    scope
        .include
        .retain(|inc| !protected.iter().any(|p| path_covers(p, inc)));
    scope
}
