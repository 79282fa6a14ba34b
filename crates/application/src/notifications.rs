//! 通知扇出
//!
//! 网关之上的薄层：当消息的另一参与者在线、但没有订阅该会话
//! 房间时，向其私有用户房间定向投递一条提醒。独立于 `new_message`。

use std::sync::Arc;

use domain::{Conversation, Message, Room, ServerEvent};
use tracing::{debug, warn};

use crate::fanout::EventFanout;
use crate::presence::PresenceStore;

/// 通知预览的最大字符数
const PREVIEW_CHARS: usize = 50;

pub struct NotificationFanout {
    fanout: Arc<dyn EventFanout>,
    presence: Arc<dyn PresenceStore>,
}

impl NotificationFanout {
    pub fn new(fanout: Arc<dyn EventFanout>, presence: Arc<dyn PresenceStore>) -> Self {
        Self { fanout, presence }
    }

    /// 尽力而为：在线状态查询或投递失败只记日志，不影响发送结果。
    pub async fn notify_new_message(&self, conversation: &Conversation, message: &Message) {
        let room = Room::conversation(conversation.id);

        for participant in &conversation.participants {
            if message.sender == Some(*participant) {
                continue;
            }

            let online = match self.presence.is_online(*participant).await {
                Ok(online) => online,
                Err(err) => {
                    warn!(error = %err, user_id = %participant, "presence lookup failed");
                    continue;
                }
            };
            if !online {
                continue;
            }
            if self.fanout.is_user_in_room(*participant, &room).await {
                // 已订阅会话房间的参与者走 new_message，不再重复提醒
                continue;
            }

            let event = ServerEvent::MessageNotification {
                conversation_id: conversation.id,
                sender: message.sender,
                preview: message.preview(PREVIEW_CHARS),
                sent_at: message.created_at,
            };
            if let Err(err) = self.fanout.publish_to_user(*participant, &event).await {
                warn!(error = %err, user_id = %participant, "message notification failed");
            } else {
                debug!(user_id = %participant, conversation_id = %conversation.id, "message notification sent");
            }
        }
    }
}
