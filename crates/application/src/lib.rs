//! 应用层实现。
//!
//! 围绕领域模型的用例服务：输入校验、会话内写入的串行化、
//! 以及对外部适配器（对象存储、图片转码、实时扇出、在线状态）的抽象。

pub mod attachments;
pub mod clock;
pub mod dto;
pub mod error;
pub mod fanout;
pub mod media;
pub mod memory;
pub mod notifications;
pub mod presence;
pub mod rate_limiter;
pub mod sequencer;
pub mod services;
pub mod storage;

pub use attachments::{AttachmentPipeline, IncomingUpload, UploadKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dto::{ConversationDto, MessageDto, MessagePage, Paginated};
pub use error::{ApplicationError, ApplicationResult};
pub use fanout::{EventFanout, FanoutError};
pub use media::{ImageTranscoder, MediaError, TranscodedImage};
pub use notifications::NotificationFanout;
pub use presence::{PresenceError, PresenceStore};
pub use rate_limiter::SendRateLimiter;
pub use sequencer::ConversationSequencer;
pub use services::{
    ConversationService, ConversationServiceDependencies, MessageService,
    MessageServiceDependencies,
};
pub use storage::{BlobStorage, PutBlobRequest, StorageError, StoredBlob};
