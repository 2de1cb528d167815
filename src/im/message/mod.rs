//! 消息模块
//!
//! 消息模型、会话消息存储（合并快照与实时事件）以及回执状态机

pub mod models;
pub mod receipt;
pub mod store;

// 重新导出主要类型
pub use models::{Attachment, AttachmentKind, Message, MessageStatus, OutgoingAttachment};
pub use receipt::ReceiptTracker;
pub use store::{MessageStore, StatusChange};
