//! 扇出策略：决定一个回合拆成几个焦点分支
//!
//! 启发式本身不稳定，作为可替换的决策函数暴露；默认实现按上下文文件
//! 触及的顶层目录数估计复杂度。

use std::collections::BTreeSet;

use super::types::{ContextSlice, FocusArea, RoundInput};

/// 分支数上限（合成假设 1–3 个视角）
pub const MAX_BRANCHES: usize = 3;

/// 可替换的扇出决策
pub trait FanoutPolicy: Send + Sync {
    /// 返回 1 到 MAX_BRANCHES 个焦点；调用方会再做一次截断
    fn decide(&self, input: &RoundInput, context: &ContextSlice) -> Vec<FocusArea>;
}

/// 默认策略：按上下文文件的顶层路径段数量扇出
///
/// 0–1 个子系统 → 单分支；2 个 → 两分支；3 个及以上 → 三分支，
/// 每个分支以对应子系统命名并携带路径提示。
pub struct ComplexityFanout;

impl ComplexityFanout {
    fn top_level_segments(context: &ContextSlice) -> Vec<String> {
        let set: BTreeSet<String> = context
            .files
            .iter()
            .filter_map(|f| f.split('/').next())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        set.into_iter().collect()
    }
}

impl FanoutPolicy for ComplexityFanout {
    fn decide(&self, input: &RoundInput, context: &ContextSlice) -> Vec<FocusArea> {
        let segments = Self::top_level_segments(context);
        if segments.len() < 2 {
            return vec![FocusArea::general()];
        }

        segments
            .into_iter()
            .take(MAX_BRANCHES)
            .map(|segment| FocusArea {
                area: segment.clone(),
                description: format!("Changes under {segment} for: {}", input.title),
                hints: vec![segment],
            })
            .collect()
    }
}

/// 结合显式覆盖与强制单分支模式，给出最终焦点列表
pub fn choose_focuses(
    policy: &dyn FanoutPolicy,
    input: &RoundInput,
    context: &ContextSlice,
    max_branches: usize,
) -> Vec<FocusArea> {
    let cap = max_branches.clamp(1, MAX_BRANCHES);

    if input.force_single {
        return vec![FocusArea::general()];
    }

    let mut focuses = if !input.explicit_focuses.is_empty() {
        input.explicit_focuses.clone()
    } else {
        policy.decide(input, context)
    };

    if focuses.is_empty() {
        focuses.push(FocusArea::general());
    }
    focuses.truncate(cap);
    focuses
}
