//! 联系人模型定义

use crate::im::serialization::{deserialize_counter, deserialize_flag};
use crate::im::types::UserId;
use serde::{Deserialize, Serialize};

/// 联系人列表中的一项
///
/// 服务器返回的 mute / is_saved 是 0/1 整数，pending 可能是字符串，
/// 均按宽松方式解析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub contact_user_id: UserId,
    #[serde(default)]
    pub contact_user_name: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub mute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    /// 是否已保存为联系人（陌生人发来消息时为 false）
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_saved: bool,
    /// 未读消息数
    #[serde(default, deserialize_with = "deserialize_counter")]
    pub pending: u32,
    #[serde(default)]
    pub last_sender_id: Option<UserId>,
    #[serde(default)]
    pub last_message: Option<String>,
}

impl ContactSnapshot {
    /// 陌生人占位条目
    pub fn placeholder(contact_user_id: UserId) -> Self {
        Self {
            contact_user_id,
            contact_user_name: contact_user_id.to_string(),
            mute: false,
            profile_image: None,
            is_saved: false,
            pending: 0,
            last_sender_id: None,
            last_message: None,
        }
    }

    /// 最后一条消息是否由对方发出（用于加粗未读摘要）
    pub fn is_incoming_last(&self) -> bool {
        self.last_sender_id == Some(self.contact_user_id)
    }
}

/// 打开会话时拉取的对方信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDetail {
    #[serde(default)]
    pub contact_list_id: Option<u64>,
    pub contact_user_id: UserId,
    #[serde(default)]
    pub contact_user_name: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub mute: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub pin: bool,
}
