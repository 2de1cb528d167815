//! 联系人列表快照的本地维护
//!
//! 服务器快照整体替换；之后由消息事件增量维护未读数与摘要

use crate::im::contact::models::ContactSnapshot;
use crate::im::message::models::Message;
use crate::im::types::UserId;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ContactBook {
    entries: Vec<ContactSnapshot>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用服务器快照替换本地列表
    pub fn replace(&mut self, entries: Vec<ContactSnapshot>) {
        debug!("[Contact] 📋 联系人快照更新，条目数: {}", entries.len());
        self.entries = entries;
    }

    pub fn get(&self, contact_id: UserId) -> Option<&ContactSnapshot> {
        self.entries.iter().find(|c| c.contact_user_id == contact_id)
    }

    fn get_mut(&mut self, contact_id: UserId) -> Option<&mut ContactSnapshot> {
        self.entries
            .iter_mut()
            .find(|c| c.contact_user_id == contact_id)
    }

    fn entry(&mut self, contact_id: UserId) -> &mut ContactSnapshot {
        let index = match self
            .entries
            .iter()
            .position(|c| c.contact_user_id == contact_id)
        {
            Some(index) => index,
            None => {
                debug!("[Contact] 👤 陌生联系人 {}，添加占位条目", contact_id);
                self.entries.push(ContactSnapshot::placeholder(contact_id));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    /// 会话被激活：未读数清零，返回是否发生变化
    pub fn mark_active(&mut self, contact_id: UserId) -> bool {
        match self.get_mut(contact_id) {
            Some(contact) if contact.pending > 0 => {
                contact.pending = 0;
                true
            }
            _ => false,
        }
    }

    /// 收到对方消息；非活动会话累加未读数
    pub fn record_inbound(&mut self, message: &Message, active: bool) -> &ContactSnapshot {
        let contact = self.entry(message.sender_id);
        contact.last_message = Some(message.preview());
        contact.last_sender_id = Some(message.sender_id);
        if !active {
            contact.pending = contact.pending.saturating_add(1);
        }
        contact
    }

    /// 自己发出的消息只更新摘要
    pub fn record_outbound(&mut self, contact_id: UserId, message: &Message) {
        let contact = self.entry(contact_id);
        contact.last_message = Some(message.preview());
        contact.last_sender_id = Some(message.sender_id);
    }

    pub fn entries(&self) -> &[ContactSnapshot] {
        &self.entries
    }

    pub fn total_pending(&self) -> u32 {
        self.entries
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(c.pending))
    }
}
