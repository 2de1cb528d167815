//! 通道监听器注册表
//!
//! 同一个事件下按监听器键去重并做引用计数：同一个键注册两次只会被
//! 调用一次，需要 `off` 同样次数才会真正移除。

use crate::im::channel::events::{EventKind, InboundEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// 通道事件监听器
#[async_trait]
pub trait ChannelListener: Send + Sync {
    /// 收到入站事件
    async fn on_event(&self, event: InboundEvent);

    /// 连接状态变化（断开 / 重连成功）
    async fn on_connection_status_changed(&self, _connected: bool) {}
}

struct Registration {
    key: String,
    handler: Arc<dyn ChannelListener>,
    refs: usize,
}

/// 按事件类型分组的监听器表
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<HashMap<EventKind, Vec<Registration>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册监听器，返回该键当前的引用计数
    ///
    /// 键已存在时只增加引用计数，不会替换也不会重复添加处理函数
    pub fn on(&self, kind: EventKind, key: &str, handler: Arc<dyn ChannelListener>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let list = entries.entry(kind).or_default();
        if let Some(reg) = list.iter_mut().find(|r| r.key == key) {
            reg.refs += 1;
            debug!(
                "[Listener] 监听器已存在 event={} key={} refs={}",
                kind.name(),
                key,
                reg.refs
            );
            return reg.refs;
        }
        list.push(Registration {
            key: key.to_string(),
            handler,
            refs: 1,
        });
        debug!("[Listener] 注册监听器 event={} key={}", kind.name(), key);
        1
    }

    /// 注销一次，引用计数归零时移除；返回是否真正移除
    pub fn off(&self, kind: EventKind, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = entries.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.key == key) else {
            return false;
        };
        list[pos].refs -= 1;
        if list[pos].refs > 0 {
            return false;
        }
        list.remove(pos);
        if list.is_empty() {
            entries.remove(&kind);
        }
        debug!("[Listener] 移除监听器 event={} key={}", kind.name(), key);
        true
    }

    /// 某个事件下不同处理函数的数量
    pub fn handler_count(&self, kind: EventKind) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&kind).map_or(0, Vec::len)
    }

    fn handlers_for(&self, kind: Option<EventKind>) -> Vec<Arc<dyn ChannelListener>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match kind {
            Some(kind) => entries
                .get(&kind)
                .map(|list| list.iter().map(|r| r.handler.clone()).collect())
                .unwrap_or_default(),
            None => {
                // 同一个键可能注册在多个事件下，连接状态只通知一次
                let mut seen: Vec<&str> = Vec::new();
                let mut handlers = Vec::new();
                for reg in entries.values().flatten() {
                    if !seen.contains(&reg.key.as_str()) {
                        seen.push(&reg.key);
                        handlers.push(reg.handler.clone());
                    }
                }
                handlers
            }
        }
    }

    /// 分发入站事件，每个处理函数恰好调用一次
    pub async fn dispatch(&self, event: InboundEvent) {
        let handlers = self.handlers_for(Some(event.kind()));
        if handlers.is_empty() {
            debug!("[Listener] 没有监听器，丢弃事件 {}", event.kind().name());
            return;
        }
        for handler in handlers {
            handler.on_event(event.clone()).await;
        }
    }

    /// 分发连接状态变化
    pub async fn dispatch_connection(&self, connected: bool) {
        for handler in self.handlers_for(None) {
            handler.on_connection_status_changed(connected).await;
        }
    }
}
