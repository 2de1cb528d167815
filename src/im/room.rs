//! 房间 ID 解析
//!
//! 单聊双方各自独立计算出同一个房间 ID，无需握手：
//! 两个用户 ID 升序排列后用 `_` 连接。

use crate::im::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 房间 ID 中两个用户 ID 之间的分隔符
pub const ROOM_SEPARATOR: char = '_';

/// 会话房间 ID（对称，与参数顺序无关）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// 根据两个参与者 ID 计算房间 ID
    pub fn between(a: UserId, b: UserId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        RoomId(format!("{low}{ROOM_SEPARATOR}{high}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        RoomId(s.to_string())
    }
}
