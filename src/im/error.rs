//! 错误类型定义
//!
//! 所有错误都只作用于当前会话，可以通过重试或重新打开会话恢复。

use crate::im::types::UserId;
use thiserror::Error;

/// 历史消息 / 联系人信息拉取失败
#[derive(Debug, Error)]
pub enum FetchError {
    /// 网络层错误（连接失败、超时等）
    #[error("请求失败: {0}")]
    Request(#[from] reqwest::Error),

    /// 非 2xx 的 HTTP 状态码
    #[error("HTTP 错误 {status}: {body}")]
    Status { status: u16, body: String },

    /// 服务器返回 `status: false`
    #[error("服务器错误: {0}")]
    Server(String),

    /// 响应体无法解析（包括格式错误的附件字段）
    #[error("反序列化响应失败: {0}")]
    Decode(#[from] serde_json::Error),

    /// 响应中缺少 data 字段
    #[error("响应中缺少 data 字段")]
    MissingData,

    /// 请求返回时会话已经切换，结果被丢弃
    #[error("会话已切换，丢弃联系人 {0} 的过期结果")]
    Superseded(UserId),
}

/// 发送消息失败；失败时本地消息列表不会残留任何条目
#[derive(Debug, Error)]
pub enum SendError {
    /// 文本为空且没有附件（不会发起网络请求）
    #[error("消息内容和附件均为空")]
    EmptyPayload,

    /// 当前没有打开的会话
    #[error("当前没有打开的会话")]
    NoActiveConversation,

    /// 附件类型不在允许范围内（仅图片和 PDF）
    #[error("不支持的附件类型: {0}")]
    UnsupportedAttachment(String),

    /// 网络请求失败
    #[error("发送失败: {0}")]
    Transport(#[from] FetchError),
}

/// 事件通道错误，只记录日志，依赖通道自身的自动重连恢复
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("通道未连接")]
    NotConnected,

    #[error("连接失败: {0}")]
    Connect(String),

    #[error("WebSocket 错误: {0}")]
    WebSocket(String),

    #[error("事件编码失败: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::WebSocket(e.to_string())
    }
}
