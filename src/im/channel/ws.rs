//! 基于 WebSocket 的事件通道
//!
//! 每个事件是一个 JSON 文本帧 `{"event": ..., "data": ...}`。
//! 连接断开后按固定间隔自动重连，重连成功后通知监听器。

use crate::im::channel::events::{InboundEvent, OutboundEvent};
use crate::im::channel::listener::ListenerRegistry;
use crate::im::channel::EventChannel;
use crate::im::error::ChannelError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket 通道配置
#[derive(Clone, Debug)]
pub struct WsChannelConfig {
    /// WebSocket 服务器 URL
    pub url: String,
    /// 认证 token（为空时不附加）
    pub token: String,
    /// 心跳间隔
    pub heartbeat_interval: Duration,
    /// 断线后重连间隔
    pub reconnect_delay: Duration,
}

/// WebSocket 事件通道（可廉价克隆）
#[derive(Clone)]
pub struct WsEventChannel {
    inner: Arc<WsInner>,
}

struct WsInner {
    config: WsChannelConfig,
    writer: Mutex<Option<WsWriter>>,
    /// 串行化 connect，避免并发建立多条连接
    connect_lock: Mutex<()>,
    connected: AtomicBool,
    closing: AtomicBool,
    listeners: ListenerRegistry,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WsEventChannel {
    pub fn new(config: WsChannelConfig) -> Self {
        Self {
            inner: Arc::new(WsInner {
                config,
                writer: Mutex::new(None),
                connect_lock: Mutex::new(()),
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                listeners: ListenerRegistry::new(),
                tasks: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// 主动关闭连接并停止自动重连
    pub async fn close(&self) {
        let _guard = self.inner.connect_lock.lock().await;
        self.inner.closing.store(true, Ordering::SeqCst);
        let tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            task.abort();
        }
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            if let Err(e) = writer.close().await {
                debug!("[Channel] 关闭写入端失败: {}", e);
            }
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        info!("[Channel] 👋 连接已关闭");
    }
}

impl WsInner {
    /// 构建 WebSocket 连接 URL
    fn build_url(&self) -> String {
        let operation_id = chrono::Utc::now().timestamp_millis();
        if self.config.token.is_empty() {
            format!("{}/?operationID={}", self.config.url, operation_id)
        } else {
            format!(
                "{}/?token={}&operationID={}",
                self.config.url, self.config.token, operation_id
            )
        }
    }

    /// 建立一条新连接，替换写入端并返回读取端
    async fn open(&self) -> Result<WsReader, ChannelError> {
        let url = self.build_url();
        debug!("[Channel] 连接地址: {}", self.config.url);
        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        info!(
            "[Channel] ✅ WebSocket 连接成功, 状态: {}",
            response.status()
        );

        let (write, read) = ws_stream.split();
        *self.writer.lock().await = Some(write);
        self.connected.store(true, Ordering::SeqCst);
        Ok(read)
    }

    /// 读取循环：连接断开后自动重连，直到主动关闭
    ///
    /// 重连与 `connect` 共用 `connect_lock`，写入端和读取端始终来自同一条连接
    async fn run(self: Arc<Self>, mut read: WsReader) {
        loop {
            self.handle_messages(read).await;
            {
                let _guard = self.connect_lock.lock().await;
                self.connected.store(false, Ordering::SeqCst);
                self.writer.lock().await.take();
            }
            if self.closing.load(Ordering::SeqCst) {
                break;
            }
            warn!("[Channel] ⚠️ 连接断开，准备自动重连");
            self.listeners.dispatch_connection(false).await;

            read = loop {
                sleep(self.config.reconnect_delay).await;
                if self.closing.load(Ordering::SeqCst) {
                    return;
                }
                let _guard = self.connect_lock.lock().await;
                if self.closing.load(Ordering::SeqCst) {
                    return;
                }
                if self.connected.load(Ordering::SeqCst) {
                    // 已经由 connect 建立了新连接，本任务随之退出
                    debug!("[Channel] 连接已由 connect 重建，停止自动重连");
                    return;
                }
                match self.open().await {
                    Ok(read) => break read,
                    Err(e) => warn!("[Channel] 重连失败: {}", e),
                }
            };
            info!("[Channel] 🔄 重连成功");
            self.listeners.dispatch_connection(true).await;
        }
    }

    /// 处理接收消息（事件循环）
    async fn handle_messages(&self, mut read: WsReader) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(WsMessage::Text(text)) => self.handle_text(&text).await,
                Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => self.handle_text(&text).await,
                    Err(e) => warn!("[Channel] 二进制帧不是 UTF-8 文本: {}", e),
                },
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(frame)) => {
                    warn!("[Channel] 👋 连接关闭: {:?}", frame);
                    break;
                }
                Err(e) => {
                    error!("[Channel] WebSocket 错误: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<InboundEvent>(text) {
            Ok(event) => {
                debug!("[Channel] 📥 收到事件: {}", event.kind().name());
                self.listeners.dispatch(event).await;
            }
            Err(e) => {
                warn!("[Channel] 丢弃无法解析的事件: {}, 原始数据: {}", e, text);
            }
        }
    }

    async fn heartbeat(self: Arc<Self>) {
        let mut ticker = interval(self.config.heartbeat_interval);
        loop {
            ticker.tick().await;
            if !self.connected.load(Ordering::SeqCst) {
                continue;
            }
            let mut guard = self.writer.lock().await;
            if let Some(w) = guard.as_mut() {
                if let Err(e) = w.send(WsMessage::Ping(Vec::new())).await {
                    debug!("[Channel] 💓 心跳发送失败: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl EventChannel for WsEventChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        info!("[Channel] 🔗 连接到事件服务器");
        self.inner.closing.store(false, Ordering::SeqCst);
        let read = self.inner.open().await?;

        {
            let mut tasks = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for task in tasks.drain(..) {
                task.abort();
            }
            tasks.push(tokio::spawn(self.inner.clone().run(read)));
            tasks.push(tokio::spawn(self.inner.clone().heartbeat()));
        }
        info!("[Channel] 💓 启动心跳，📥 开始监听服务器事件");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        let json = serde_json::to_string(&event)?;
        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(ChannelError::NotConnected)?;
        writer.send(WsMessage::Text(json)).await?;
        debug!("[Channel] 📤 发送事件: {}", event.name());
        Ok(())
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }
}
