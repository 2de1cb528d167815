//! 通道生命周期管理
//!
//! - 任何房间操作之前确保通道已连接
//! - 切换会话时先离开旧房间再加入新房间，join/leave 成对出现
//! - 会话结束时注销本会话注册的全部监听器
//! - 重连后重新加入当前房间（服务器端的房间成员关系不会跨连接保留）

use crate::im::channel::events::{EventKind, OutboundEvent};
use crate::im::channel::listener::ChannelListener;
use crate::im::channel::EventChannel;
use crate::im::error::ChannelError;
use crate::im::room::RoomId;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ChannelLifecycle {
    channel: Arc<dyn EventChannel>,
    /// 当前会话的房间
    active: Option<RoomId>,
    /// join 是否已成功发出（决定离开时是否需要发送 leave）
    joined: bool,
    registrations: Vec<(EventKind, String)>,
}

impl ChannelLifecycle {
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        Self {
            channel,
            active: None,
            joined: false,
            registrations: Vec::new(),
        }
    }

    /// 未连接时发起连接
    pub async fn ensure_connected(&self) -> Result<(), ChannelError> {
        if self.channel.is_connected() {
            return Ok(());
        }
        info!("[Channel] 🔗 通道未连接，开始连接");
        self.channel.connect().await
    }

    /// 激活房间：离开上一个房间后加入新房间
    pub async fn activate(&mut self, room: RoomId) {
        if self.active.as_ref() == Some(&room) && self.joined {
            debug!("[Channel] 已在房间 {} 中", room);
            return;
        }
        self.deactivate().await;

        if let Err(e) = self.ensure_connected().await {
            warn!("[Channel] ⚠️ 连接失败，等待自动重连后加入房间 {}: {}", room, e);
        }
        self.joined = self.emit_join(&room).await;
        self.active = Some(room);
    }

    /// 离开当前房间（从未成功加入的房间不会发送 leave）
    pub async fn deactivate(&mut self) {
        let Some(room) = self.active.take() else {
            return;
        };
        if std::mem::take(&mut self.joined) {
            info!("[Channel] 👋 离开房间 {}", room);
            if let Err(e) = self.channel.emit(OutboundEvent::LeaveRoom(room.clone())).await {
                warn!("[Channel] ⚠️ 发送 leave 失败 room={}: {}", room, e);
            }
        }
    }

    /// 为所有入站事件注册同一个处理函数
    pub fn register(&mut self, key: &str, handler: Arc<dyn ChannelListener>) {
        for kind in EventKind::ALL {
            self.channel.listeners().on(kind, key, handler.clone());
            self.registrations.push((kind, key.to_string()));
        }
    }

    /// 离开房间并注销本生命周期注册过的全部监听器
    pub async fn teardown(&mut self) {
        self.deactivate().await;
        for (kind, key) in self.registrations.drain(..) {
            self.channel.listeners().off(kind, &key);
        }
        debug!("[Channel] 🧹 监听器已全部注销");
    }

    /// 连接断开：服务器端已丢弃房间成员关系
    pub fn on_disconnected(&mut self) {
        self.joined = false;
    }

    /// 重连成功：重新加入当前房间
    pub async fn on_reconnected(&mut self) {
        let Some(room) = self.active.clone() else {
            return;
        };
        info!("[Channel] 🔄 重连后重新加入房间 {}", room);
        self.joined = self.emit_join(&room).await;
    }

    async fn emit_join(&self, room: &RoomId) -> bool {
        info!("[Channel] 🚪 加入房间 {}", room);
        match self.channel.emit(OutboundEvent::JoinRoom(room.clone())).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[Channel] ⚠️ 发送 join 失败 room={}: {}", room, e);
                false
            }
        }
    }
}
