//! 消息子系统核心领域模型
//!
//! 包含会话、消息、附件等核心实体，以及实时事件词汇表和仓储接口。

pub mod attachment;
pub mod conversation;
pub mod errors;
pub mod events;
pub mod message;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use attachment::*;
pub use conversation::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use repositories::*;
pub use value_objects::*;
