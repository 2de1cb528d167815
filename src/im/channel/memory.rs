//! 进程内事件通道
//!
//! 记录所有发出的事件，并允许直接注入入站事件，用于测试和离线调试

use crate::im::channel::events::{InboundEvent, OutboundEvent};
use crate::im::channel::listener::ListenerRegistry;
use crate::im::channel::EventChannel;
use crate::im::error::ChannelError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

#[derive(Default)]
pub struct MemoryChannel {
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    emitted: Mutex<Vec<(Instant, OutboundEvent)>>,
    listeners: ListenerRegistry,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发出的事件（按发送顺序）
    pub fn emitted(&self) -> Vec<OutboundEvent> {
        self.emitted_at().into_iter().map(|(_, e)| e).collect()
    }

    /// 已发出的事件及发送时刻
    pub fn emitted_at(&self) -> Vec<(Instant, OutboundEvent)> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_emitted(&self) {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// 模拟服务器推送
    pub async fn inject(&self, event: InboundEvent) {
        self.listeners.dispatch(event).await;
    }

    /// 模拟断线
    pub async fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.listeners.dispatch_connection(false).await;
    }

    /// 模拟自动重连成功
    pub async fn restore_connection(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.listeners.dispatch_connection(true).await;
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Instant::now(), event));
        Ok(())
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}
