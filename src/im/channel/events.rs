//! 事件通道上的事件定义
//!
//! 线上格式为 JSON 文本帧：`{"event": "<名称>", "data": <载荷>}`

use crate::im::message::models::{Message, MessageStatus};
use crate::im::room::RoomId;
use crate::im::types::{MessageId, UserId};
use serde::{Deserialize, Serialize};

/// 入站事件名称
pub mod event_name {
    pub const USER_TYPING: &str = "user_typing";
    pub const USER_STOP_TYPING: &str = "user_stop_typing";
    pub const RECEIVE_MESSAGE: &str = "receive_message";
    pub const MESSAGE_STATUS_UPDATED: &str = "message_status_updated";
}

/// 输入状态信号（typing / stop_typing）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// 送达 / 已读回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub room_id: RoomId,
    pub message_id: MessageId,
}

/// 服务器推送的消息状态变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub message_id: MessageId,
    pub status: MessageStatus,
    /// 所属房间（服务器可能不返回）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

/// 客户端发出的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "join_chat")]
    JoinRoom(RoomId),
    #[serde(rename = "leave_chat")]
    LeaveRoom(RoomId),
    #[serde(rename = "typing")]
    Typing(TypingSignal),
    #[serde(rename = "stop_typing")]
    StopTyping(TypingSignal),
    #[serde(rename = "message_delivered")]
    MessageDelivered(Receipt),
    #[serde(rename = "message_read")]
    MessageRead(Receipt),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinRoom(_) => "join_chat",
            OutboundEvent::LeaveRoom(_) => "leave_chat",
            OutboundEvent::Typing(_) => "typing",
            OutboundEvent::StopTyping(_) => "stop_typing",
            OutboundEvent::MessageDelivered(_) => "message_delivered",
            OutboundEvent::MessageRead(_) => "message_read",
        }
    }
}

/// 服务器推送的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "user_typing")]
    PeerTyping(UserId),
    #[serde(rename = "user_stop_typing")]
    PeerStopTyping(UserId),
    #[serde(rename = "receive_message")]
    MessageReceived(Message),
    #[serde(rename = "message_status_updated")]
    StatusUpdated(StatusUpdate),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::PeerTyping(_) => EventKind::PeerTyping,
            InboundEvent::PeerStopTyping(_) => EventKind::PeerStopTyping,
            InboundEvent::MessageReceived(_) => EventKind::MessageReceived,
            InboundEvent::StatusUpdated(_) => EventKind::StatusUpdated,
        }
    }
}

/// 入站事件类型，用作监听器注册的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PeerTyping,
    PeerStopTyping,
    MessageReceived,
    StatusUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::PeerTyping,
        EventKind::PeerStopTyping,
        EventKind::MessageReceived,
        EventKind::StatusUpdated,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::PeerTyping => event_name::USER_TYPING,
            EventKind::PeerStopTyping => event_name::USER_STOP_TYPING,
            EventKind::MessageReceived => event_name::RECEIVE_MESSAGE,
            EventKind::StatusUpdated => event_name::MESSAGE_STATUS_UPDATED,
        }
    }
}
