//! 能力标签：对生成行为的语义化请求，与具体后端解耦
//!
//! 配置文件中能力以字符串键出现；未知键解析为 Custom 变体而非静默吞掉，
//! 以便 validate() 能够报告拼写错误的能力名。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 能力标签（planning / writing / coding / reviewing / fast + 自定义）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// 高层推理、架构决策
    Planning,
    /// 文档、提案、规格书写作
    Writing,
    /// 代码生成与实现
    Coding,
    /// 代码评审、质量分析
    Reviewing,
    /// 快速响应、简单任务
    Fast,
    /// 配置中出现的未知能力键，保留原字符串
    Custom(String),
}

impl Capability {
    pub fn as_str(&self) -> &str {
        match self {
            Capability::Planning => "planning",
            Capability::Writing => "writing",
            Capability::Coding => "coding",
            Capability::Reviewing => "reviewing",
            Capability::Fast => "fast",
            Capability::Custom(name) => name,
        }
    }

    /// 是否为封闭集合内的已知能力
    pub fn is_known(&self) -> bool {
        !matches!(self, Capability::Custom(_))
    }
}

impl FromStr for Capability {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "planning" => Capability::Planning,
            "writing" => Capability::Writing,
            "coding" => Capability::Coding,
            "reviewing" => Capability::Reviewing,
            "fast" => Capability::Fast,
            other => Capability::Custom(other.to_string()),
        })
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // FromStr 不会失败：未知键落入 Custom
        Ok(s.parse().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_capability_roundtrip() {
        for name in ["planning", "writing", "coding", "reviewing", "fast"] {
            let cap: Capability = name.parse().unwrap();
            assert!(cap.is_known());
            assert_eq!(cap.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_capability_preserved_as_custom() {
        let cap: Capability = "summarizing".parse().unwrap();
        assert_eq!(cap, Capability::Custom("summarizing".to_string()));
        assert!(!cap.is_known());
        assert_eq!(cap.as_str(), "summarizing");
    }

    #[test]
    fn test_serde_string_form() {
        let cap: Capability = serde_json::from_str("\"coding\"").unwrap();
        assert_eq!(cap, Capability::Coding);
        assert_eq!(serde_json::to_string(&cap).unwrap(), "\"coding\"");

        let custom: Capability = serde_json::from_str("\"translating\"").unwrap();
        assert_eq!(custom, Capability::Custom("translating".to_string()));
    }
}
