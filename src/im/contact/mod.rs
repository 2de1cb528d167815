//! 联系人模块
//!
//! 维护联系人列表快照：未读计数、最后一条消息摘要和最后发送者

pub mod book;
pub mod models;

pub use book::ContactBook;
pub use models::{ContactDetail, ContactSnapshot};
