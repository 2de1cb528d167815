//! 事件通道模块
//!
//! 核心逻辑只依赖 [`EventChannel`] 接口，具体连接（WebSocket 或内存实现）
//! 由外部注入，方便在没有真实连接的情况下测试。

pub mod events;
pub mod lifecycle;
pub mod listener;
pub mod memory;
pub mod ws;

use crate::im::error::ChannelError;
use async_trait::async_trait;

pub use events::{EventKind, InboundEvent, OutboundEvent, Receipt, StatusUpdate, TypingSignal};
pub use lifecycle::ChannelLifecycle;
pub use listener::{ChannelListener, ListenerRegistry};
pub use memory::MemoryChannel;
pub use ws::{WsChannelConfig, WsEventChannel};

/// 双向事件通道
///
/// 实现方负责断线后的自动重连，并在重连后通过
/// [`ListenerRegistry::dispatch_connection`] 通知监听器
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// 建立连接（已连接时直接返回）
    async fn connect(&self) -> Result<(), ChannelError>;

    /// 当前是否已连接
    fn is_connected(&self) -> bool;

    /// 发送事件
    async fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError>;

    /// 入站事件监听器表
    fn listeners(&self) -> &ListenerRegistry;
}
