//! 送达 / 已读回执状态机
//!
//! 本地只负责为"收到的"消息发出回执；自己发出的消息的状态只由
//! 服务器推送的 `message_status_updated` 事件驱动，从不在本地推断。

use crate::im::channel::events::{OutboundEvent, Receipt};
use crate::im::message::models::{Message, MessageStatus};
use crate::im::room::RoomId;
use crate::im::types::{MessageId, UserId};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// 送达记录最多保留的条数，超出后按先进先出淘汰
pub const DEFAULT_DELIVERED_LIMIT: usize = 4096;

/// 收到一条对方消息时的观察结果
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    /// 是否第一次看到这条消息（重复投递时为 false）
    pub first_seen: bool,
    /// 需要发出的送达回执
    pub ack: Option<OutboundEvent>,
}

/// 记录已经发出过的回执，避免重复发送
#[derive(Debug)]
pub struct ReceiptTracker {
    delivered: HashSet<(RoomId, MessageId)>,
    /// 送达记录的插入顺序，用于淘汰最旧的条目
    delivered_order: VecDeque<(RoomId, MessageId)>,
    delivered_limit: usize,
    read: HashSet<(RoomId, MessageId)>,
}

impl Default for ReceiptTracker {
    fn default() -> Self {
        Self::with_limit(DEFAULT_DELIVERED_LIMIT)
    }
}

impl ReceiptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(delivered_limit: usize) -> Self {
        Self {
            delivered: HashSet::new(),
            delivered_order: VecDeque::new(),
            delivered_limit: delivered_limit.max(1),
            read: HashSet::new(),
        }
    }

    /// 记录一条送达；已经记录过时返回 false
    fn remember_delivered(&mut self, key: (RoomId, MessageId)) -> bool {
        if !self.delivered.insert(key.clone()) {
            return false;
        }
        self.delivered_order.push_back(key);
        while self.delivered_order.len() > self.delivered_limit {
            if let Some(oldest) = self.delivered_order.pop_front() {
                self.delivered.remove(&oldest);
            }
        }
        true
    }

    /// 观察一条收到的消息
    ///
    /// 第一次看到对方发来的消息时生成发往对方房间的送达回执；
    /// 自己发出的消息永远不是"第一次看到"
    pub fn observe_incoming(&mut self, message: &Message, me: UserId) -> Sighting {
        if message.is_from(me) {
            return Sighting {
                first_seen: false,
                ack: None,
            };
        }
        let room = RoomId::between(me, message.sender_id);
        let first_seen = self.remember_delivered((room.clone(), message.id));
        if !first_seen || message.status >= MessageStatus::Delivered {
            return Sighting {
                first_seen,
                ack: None,
            };
        }
        debug!(
            "[Receipt] 📬 送达回执 room={} messageId={}",
            room, message.id
        );
        Sighting {
            first_seen,
            ack: Some(OutboundEvent::MessageDelivered(Receipt {
                room_id: room,
                message_id: message.id,
            })),
        }
    }

    /// 可见消息列表变化时，为所有对方发来且尚未已读的消息生成已读回执
    pub fn collect_reads<'a>(
        &mut self,
        messages: impl IntoIterator<Item = &'a Message>,
        me: UserId,
        peer: UserId,
    ) -> Vec<OutboundEvent> {
        let room = RoomId::between(me, peer);
        let mut acks = Vec::new();
        for message in messages {
            if message.sender_id != peer || message.status == MessageStatus::Read {
                continue;
            }
            let key = (room.clone(), message.id);
            if !self.read.insert(key.clone()) {
                continue;
            }
            // 已读隐含已送达
            self.remember_delivered(key);
            acks.push(OutboundEvent::MessageRead(Receipt {
                room_id: room.clone(),
                message_id: message.id,
            }));
        }
        if !acks.is_empty() {
            debug!("[Receipt] 👀 已读回执 room={} 条数={}", room, acks.len());
        }
        acks
    }

    /// 会话关闭后清除已读记录，重新打开时仍未已读的消息会再次回执
    ///
    /// 送达记录保留，用于识别重复投递
    pub fn forget_reads(&mut self, room: &RoomId) {
        self.read.retain(|(r, _)| r != room);
    }
}
