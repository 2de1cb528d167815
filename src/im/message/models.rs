//! 消息模型定义

use crate::im::room::RoomId;
use crate::im::serialization::{deserialize_attachments, deserialize_null_default};
use crate::im::types::{MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 消息状态（仅对本地用户发出的消息有意义）
///
/// 单调递增：sent < delivered < read，不允许回退
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// 尝试推进到 `next`，只有严格前进时才返回新状态
    pub fn advance(self, next: MessageStatus) -> Option<MessageStatus> {
        (next > self).then_some(next)
    }
}

/// 附件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

/// 消息附件（随消息创建，之后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// 服务器存储的相对路径
    pub url: String,
    /// 原始文件名
    #[serde(default)]
    pub filename: String,
}

impl Attachment {
    /// 拼接成完整的下载地址
    pub fn resolve_url(&self, server_origin: &str) -> String {
        format!("{}{}", server_origin.trim_end_matches('/'), self.url)
    }
}

/// 聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    /// 接收者 ID（服务器可能不返回）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    /// 文本内容，只有附件的消息可以为空
    #[serde(rename = "message", default)]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: String,
    /// 缺失或 null 时视为 sent
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub status: MessageStatus,
    #[serde(default, deserialize_with = "deserialize_attachments")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn is_from(&self, user_id: UserId) -> bool {
        self.sender_id == user_id
    }

    /// 判断消息是否属于 `me` 与 `peer` 之间的会话
    ///
    /// 有接收者时按房间比较；没有接收者时只接受对方发来的消息
    pub fn belongs_to(&self, me: UserId, peer: UserId) -> bool {
        match self.receiver_id {
            Some(receiver) => RoomId::between(self.sender_id, receiver) == RoomId::between(me, peer),
            None => self.sender_id == peer,
        }
    }

    /// 会话列表中展示的摘要
    pub fn preview(&self) -> String {
        match self.body.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => match self.attachments.first().map(|a| a.kind) {
                Some(AttachmentKind::Image) => "[图片]".to_string(),
                Some(AttachmentKind::File) => "[文件]".to_string(),
                None => String::new(),
            },
        }
    }
}

/// 待上传的附件
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl OutgoingAttachment {
    pub fn new(filename: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// 从本地文件读取，根据扩展名推断 MIME 类型
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime_from_extension(path).to_string();
        Ok(Self::new(filename, mime, bytes))
    }

    /// 只允许上传图片和 PDF
    pub fn is_allowed(&self) -> bool {
        self.mime.starts_with("image/") || self.mime == "application/pdf"
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
