//! 会话消息存储（内存）
//!
//! 合并快照拉取结果与实时事件，得到一个有序、无重复的消息列表：
//! - 同一个 ID 只保留一条，重复到达时只更新状态
//! - 按到达顺序排列，不按 ID 重排
//! - 状态只能前进（sent < delivered < read）

use crate::im::message::models::{Message, MessageStatus};
use crate::im::types::MessageId;
use std::collections::HashMap;
use tracing::debug;

/// 状态更新结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// 状态已前进
    Applied(MessageStatus),
    /// 新状态不高于当前状态，忽略
    Ignored,
    /// 消息尚未到达（状态事件可能先于消息本身到达）
    Unknown,
}

/// 单个会话的消息列表，按 ID 建索引
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    /// message id -> messages 中的位置
    index: HashMap<MessageId, usize>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 幂等插入：已存在相同 ID 时不做任何修改，返回 false
    pub fn append(&mut self, message: Message) -> bool {
        if self.index.contains_key(&message.id) {
            debug!("[MsgStore] 忽略重复消息 id={}", message.id);
            return false;
        }
        self.index.insert(message.id, self.messages.len());
        self.messages.push(message);
        true
    }

    /// 用服务器快照替换整个列表
    ///
    /// `carry_from` 之后的条目是拉取期间通过实时通道到达的消息：
    /// 快照里已有的只合并状态，快照里没有的按到达顺序追加到末尾
    pub fn reseed(&mut self, snapshot: Vec<Message>, carry_from: usize) {
        let live: Vec<Message> = if carry_from < self.messages.len() {
            self.messages.split_off(carry_from)
        } else {
            Vec::new()
        };

        self.messages.clear();
        self.index.clear();
        for message in snapshot {
            self.append(message);
        }

        for message in live {
            let (id, status) = (message.id, message.status);
            if !self.append(message) {
                self.update_status(id, status);
            }
        }
        debug!("[MsgStore] 快照替换完成，共 {} 条消息", self.messages.len());
    }

    /// 更新消息状态；未知 ID 不是错误
    pub fn update_status(&mut self, id: MessageId, status: MessageStatus) -> StatusChange {
        let Some(&pos) = self.index.get(&id) else {
            return StatusChange::Unknown;
        };
        let message = &mut self.messages[pos];
        match message.status.advance(status) {
            Some(next) => {
                message.status = next;
                StatusChange::Applied(next)
            }
            None => StatusChange::Ignored,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.index.get(&id).map(|&pos| &self.messages[pos])
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn status_of(&self, id: MessageId) -> Option<MessageStatus> {
        self.get(id).map(|m| m.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// 只读快照，供 UI 渲染
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
