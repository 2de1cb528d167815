//! 会话监听器回调接口（供 UI 层注册）

use crate::im::contact::models::ContactSnapshot;
use crate::im::message::models::{Message, MessageStatus};
use crate::im::types::MessageId;
use async_trait::async_trait;

#[async_trait]
pub trait ConversationListener: Send + Sync {
    /// 当前会话的消息列表变化（种子加载、新消息、发送成功）
    async fn on_messages_changed(&self, messages: Vec<Message>);

    /// 自己发出的消息状态推进
    async fn on_message_status_changed(&self, message_id: MessageId, status: MessageStatus);

    /// 对方输入状态变化
    async fn on_peer_typing_changed(&self, typing: bool);

    /// 联系人列表变化（未读数、摘要）
    async fn on_contacts_changed(&self, contacts: Vec<ContactSnapshot>);

    /// 非活动且未免打扰的会话收到新消息（用于提示音、桌面通知）
    async fn on_unread_message(&self, contact: ContactSnapshot, message: Message);

    /// 事件通道连接状态变化
    async fn on_connection_status_changed(&self, connected: bool);
}

/// 空实现（默认监听器）
pub struct EmptyConversationListener;

#[async_trait]
impl ConversationListener for EmptyConversationListener {
    async fn on_messages_changed(&self, _messages: Vec<Message>) {}
    async fn on_message_status_changed(&self, _message_id: MessageId, _status: MessageStatus) {}
    async fn on_peer_typing_changed(&self, _typing: bool) {}
    async fn on_contacts_changed(&self, _contacts: Vec<ContactSnapshot>) {}
    async fn on_unread_message(&self, _contact: ContactSnapshot, _message: Message) {}
    async fn on_connection_status_changed(&self, _connected: bool) {}
}
