//! 规划回合使用的主题命名
//!
//! 主题为点分层级，应答主题把请求关联 ID 放在尾段，便于用
//! `plan.focus.response.*` 这类过滤器监听一整族应答。

/// 焦点规划请求的发布主题
pub const FOCUS_REQUEST: &str = "plan.focus.request";

/// 焦点应答主题前缀，尾段为请求关联 ID
pub const FOCUS_RESPONSE_PREFIX: &str = "plan.focus.response";

/// 某个请求的应答主题
pub fn focus_response(request_id: &str) -> String {
    format!("{FOCUS_RESPONSE_PREFIX}.{request_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::subject_matches;

    #[test]
    fn test_response_subject_matches_wildcard() {
        let subject = focus_response("abc-123");
        assert!(subject_matches("plan.focus.response.*", &subject));
        assert!(!subject_matches("plan.focus.response.*", FOCUS_REQUEST));
    }
}
