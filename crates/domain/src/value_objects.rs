use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

uuid_id!(
    /// 用户唯一标识。
    UserId
);
uuid_id!(
    /// 会话唯一标识。
    ConversationId
);
uuid_id!(
    /// 消息唯一标识。
    MessageId
);
uuid_id!(
    /// 订单唯一标识（外部系统拥有其生命周期）。
    OrderId
);
uuid_id!(
    /// 服务（gig）唯一标识（外部系统拥有其生命周期）。
    GigId
);

/// 消息内容上限（字符数）。
pub const MAX_CONTENT_CHARS: usize = 1000;

/// 经过验证的消息正文。
///
/// 所有消息类型都要求非空正文：非文本消息用它承载可读摘要。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::validation("content", "消息内容不能为空"));
        }
        if value.chars().count() > MAX_CONTENT_CHARS {
            return Err(DomainError::validation(
                "content",
                format!("消息内容不能超过{}个字符", MAX_CONTENT_CHARS),
            ));
        }
        Ok(Self(value))
    }

    /// 绕过校验，用于从存储层恢复以及写入固定占位内容。
    pub fn from_trusted(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 截取用于通知的消息预览。
    pub fn preview(&self, max_chars: usize) -> String {
        if self.0.chars().count() <= max_chars {
            self.0.clone()
        } else {
            let truncated: String = self.0.chars().take(max_chars).collect();
            format!("{}...", truncated)
        }
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_rejects_empty_and_overlong() {
        assert!(MessageContent::new("").is_err());
        assert!(MessageContent::new("   ").is_err());
        assert!(MessageContent::new("a".repeat(1000)).is_ok());
        assert!(MessageContent::new("a".repeat(1001)).is_err());
    }

    #[test]
    fn content_preview_truncates_on_char_boundary() {
        let content = MessageContent::new("你好世界你好世界").unwrap();
        assert_eq!(content.preview(4), "你好世界...");
        assert_eq!(content.preview(50), "你好世界你好世界");
    }
}
