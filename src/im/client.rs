//! 聊天客户端
//!
//! 把房间、消息存储、回执、输入状态和通道生命周期组合成一个面向 UI 的会话：
//! - 同一时刻只有一个活动会话，切换会话时旧会话的结果一律丢弃
//! - 所有状态修改都在 `state` 锁内完成，出站事件和 UI 回调在释放锁之后执行

use crate::im::api::{ChatApi, HttpChatApi};
use crate::im::channel::events::{InboundEvent, OutboundEvent, StatusUpdate};
use crate::im::channel::lifecycle::ChannelLifecycle;
use crate::im::channel::listener::ChannelListener;
use crate::im::channel::ws::{WsChannelConfig, WsEventChannel};
use crate::im::channel::EventChannel;
use crate::im::contact::book::ContactBook;
use crate::im::contact::models::{ContactDetail, ContactSnapshot};
use crate::im::error::{ChannelError, FetchError, SendError};
use crate::im::listener::{ConversationListener, EmptyConversationListener};
use crate::im::message::models::{Message, MessageStatus, OutgoingAttachment};
use crate::im::message::receipt::ReceiptTracker;
use crate::im::message::store::{MessageStore, StatusChange};
use crate::im::room::RoomId;
use crate::im::typing::{TypingCoordinator, DEFAULT_TYPING_STOP_DELAY};
use crate::im::types::{MessageId, UserId};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 当前登录用户 ID
    pub user_id: UserId,
    /// 认证 token
    pub token: String,
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// 事件通道 WebSocket 地址
    pub ws_url: String,
    /// 附件、头像等静态资源的服务器地址
    pub server_origin: String,
    /// 停止输入后多久发送 stop_typing
    pub typing_stop_delay: Duration,
    /// 心跳间隔
    pub heartbeat_interval: Duration,
    /// 断线重连间隔
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: token.into(),
            api_base_url: "http://localhost:5000".to_string(),
            ws_url: "ws://localhost:5000".to_string(),
            server_origin: "http://localhost:5000".to_string(),
            typing_stop_delay: DEFAULT_TYPING_STOP_DELAY,
            heartbeat_interval: Duration::from_secs(25),
            reconnect_delay: Duration::from_secs(3),
        }
    }

    pub fn ws_channel_config(&self) -> WsChannelConfig {
        WsChannelConfig {
            url: self.ws_url.clone(),
            token: self.token.clone(),
            heartbeat_interval: self.heartbeat_interval,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

/// 当前打开的会话
struct ActiveConversation {
    contact_id: UserId,
    room: RoomId,
    /// 打开会话时的代数，用于判断发送结果是否仍属于本会话
    session: u64,
    store: MessageStore,
    detail: Option<ContactDetail>,
}

struct ConversationState {
    /// 每次打开 / 关闭会话都会递增，过期的拉取结果据此丢弃
    generation: u64,
    active: Option<ActiveConversation>,
    lifecycle: ChannelLifecycle,
    receipts: ReceiptTracker,
    contacts: ContactBook,
    /// 会话视图是否可见，只有可见时才发送已读回执
    visible: bool,
}

/// 一次状态修改产生的副作用，在释放锁之后执行
#[derive(Default)]
struct Effects {
    outbound: Vec<OutboundEvent>,
    messages: Option<Vec<Message>>,
    statuses: Vec<(MessageId, MessageStatus)>,
    peer_typing: Option<bool>,
    contacts: Option<Vec<ContactSnapshot>>,
    unread: Option<(ContactSnapshot, Message)>,
}

struct ClientInner {
    config: ClientConfig,
    api: Arc<dyn ChatApi>,
    channel: Arc<dyn EventChannel>,
    typing: TypingCoordinator,
    state: Mutex<ConversationState>,
    listener: RwLock<Arc<dyn ConversationListener>>,
}

/// 聊天客户端（可廉价克隆）
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    /// 使用 HTTP API 和 WebSocket 通道创建客户端
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let api = HttpChatApi::new(config.api_base_url.clone(), &config.token)?;
        let channel = WsEventChannel::new(config.ws_channel_config());
        Ok(Self::with_parts(config, Arc::new(api), Arc::new(channel)))
    }

    /// 使用外部提供的 API 和事件通道创建客户端
    pub fn with_parts(
        config: ClientConfig,
        api: Arc<dyn ChatApi>,
        channel: Arc<dyn EventChannel>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let mut lifecycle = ChannelLifecycle::new(channel.clone());
            lifecycle.register(
                &format!("conversation-{}", config.user_id),
                Arc::new(ConversationEventHandler {
                    inner: weak.clone(),
                }),
            );
            ClientInner {
                typing: TypingCoordinator::new(channel.clone(), config.typing_stop_delay),
                config,
                api,
                channel,
                state: Mutex::new(ConversationState {
                    generation: 0,
                    active: None,
                    lifecycle,
                    receipts: ReceiptTracker::new(),
                    contacts: ContactBook::new(),
                    visible: true,
                }),
                listener: RwLock::new(Arc::new(EmptyConversationListener)),
            }
        });
        Self { inner }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// 设置会话监听器
    pub fn set_listener(&self, listener: Arc<dyn ConversationListener>) {
        *self
            .inner
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// 连接事件通道
    pub async fn connect(&self) -> Result<(), ChannelError> {
        info!("[Client] 🔗 用户 {} 连接事件通道", self.inner.config.user_id);
        self.inner.channel.connect().await
    }

    /// 打开与某个联系人的会话并加载历史消息
    ///
    /// 加载期间如果会话被切换或关闭，返回 [`FetchError::Superseded`]
    pub async fn open_conversation(&self, contact_id: UserId) -> Result<Vec<Message>, FetchError> {
        self.inner.open_conversation(contact_id).await
    }

    /// 关闭当前会话
    pub async fn close_conversation(&self) {
        self.inner.close_conversation().await
    }

    /// 发送消息（文本和附件至少有一项）
    pub async fn send(
        &self,
        text: Option<&str>,
        attachments: Vec<OutgoingAttachment>,
    ) -> Result<Message, SendError> {
        self.inner.send(text, attachments).await
    }

    /// 本地输入框内容变化
    pub async fn input_changed(&self) {
        let me = self.inner.config.user_id;
        // 持有状态锁直到计时器启动，切换会话时的 flush 一定能看到它
        let state = self.inner.state.lock().await;
        match state.active.as_ref() {
            Some(active) => {
                self.inner
                    .typing
                    .input_changed(active.room.clone(), me)
                    .await
            }
            None => debug!("[Client] 没有活动会话，忽略输入事件"),
        }
    }

    /// 会话视图可见性变化；重新可见时补发已读回执
    pub async fn set_visible(&self, visible: bool) {
        self.inner.set_visible(visible).await
    }

    /// 重新拉取联系人列表
    pub async fn refresh_contacts(&self) -> Result<Vec<ContactSnapshot>, FetchError> {
        self.inner.refresh_contacts().await
    }

    /// 离开房间并注销通道监听器
    pub async fn shutdown(&self) {
        self.inner.close_conversation().await;
        self.inner.state.lock().await.lifecycle.teardown().await;
        info!("[Client] 👋 客户端已关闭");
    }

    /// 当前会话的消息快照
    pub async fn messages(&self) -> Vec<Message> {
        let state = self.inner.state.lock().await;
        state
            .active
            .as_ref()
            .map(|a| a.store.snapshot())
            .unwrap_or_default()
    }

    pub async fn message_status(&self, message_id: MessageId) -> Option<MessageStatus> {
        let state = self.inner.state.lock().await;
        state.active.as_ref()?.store.status_of(message_id)
    }

    pub async fn active_contact(&self) -> Option<UserId> {
        let state = self.inner.state.lock().await;
        state.active.as_ref().map(|a| a.contact_id)
    }

    pub async fn contact_detail(&self) -> Option<ContactDetail> {
        let state = self.inner.state.lock().await;
        state.active.as_ref()?.detail.clone()
    }

    pub async fn contacts(&self) -> Vec<ContactSnapshot> {
        self.inner.state.lock().await.contacts.entries().to_vec()
    }

    /// 所有联系人的未读消息总数
    pub async fn total_pending(&self) -> u32 {
        self.inner.state.lock().await.contacts.total_pending()
    }

    pub fn is_peer_typing(&self) -> bool {
        self.inner.typing.is_peer_typing()
    }
}

impl ClientInner {
    fn listener(&self) -> Arc<dyn ConversationListener> {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn open_conversation(&self, contact_id: UserId) -> Result<Vec<Message>, FetchError> {
        let me = self.config.user_id;
        let room = RoomId::between(me, contact_id);
        let mut effects = Effects::default();

        let (generation, carry_from) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.generation += 1;

            let same = state
                .active
                .as_ref()
                .is_some_and(|a| a.contact_id == contact_id);
            if !same {
                // stop_typing 必须在离开旧房间之前发出
                self.typing.flush().await;
                if self.typing.reset_peer() {
                    effects.peer_typing = Some(false);
                }
                if let Some(previous) = state.active.take() {
                    info!(
                        "[Client] 🔀 切换会话 {} -> {}",
                        previous.contact_id, contact_id
                    );
                    state.receipts.forget_reads(&previous.room);
                }
                state.active = Some(ActiveConversation {
                    contact_id,
                    room: room.clone(),
                    session: state.generation,
                    store: MessageStore::new(),
                    detail: None,
                });
                effects.messages = Some(Vec::new());
            }

            state.lifecycle.activate(room.clone()).await;
            if state.contacts.mark_active(contact_id) {
                effects.contacts = Some(state.contacts.entries().to_vec());
            }
            let carry_from = state.active.as_ref().map_or(0, |a| a.store.len());
            (state.generation, carry_from)
        };
        self.apply(effects).await;

        info!("[Client] 📂 打开会话 room={}，开始加载历史消息", room);
        let (history, detail) = tokio::join!(
            self.api.get_messages(contact_id),
            self.api.get_contact_detail(me, contact_id)
        );

        let mut effects = Effects::default();
        let seeded = 'seed: {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.generation != generation {
                info!("[Client] ⏭️ 会话已切换，丢弃联系人 {} 的历史消息", contact_id);
                return Err(FetchError::Superseded(contact_id));
            }
            let Some(active) = state
                .active
                .as_mut()
                .filter(|a| a.contact_id == contact_id)
            else {
                return Err(FetchError::Superseded(contact_id));
            };

            let history = match history {
                Ok(history) => history,
                Err(e) => {
                    warn!("[Client] ❌ 加载联系人 {} 的历史消息失败: {}", contact_id, e);
                    active.store = MessageStore::new();
                    effects.messages = Some(Vec::new());
                    break 'seed Err(e);
                }
            };
            active.store.reseed(history, carry_from);
            match detail {
                Ok(detail) => active.detail = Some(detail),
                Err(e) => warn!("[Client] ⚠️ 拉取联系人 {} 信息失败: {}", contact_id, e),
            }

            for message in active.store.iter() {
                effects
                    .outbound
                    .extend(state.receipts.observe_incoming(message, me).ack);
            }
            if state.visible {
                effects.outbound.extend(state.receipts.collect_reads(
                    active.store.iter(),
                    me,
                    contact_id,
                ));
            }
            let messages = active.store.snapshot();
            effects.messages = Some(messages.clone());
            Ok(messages)
        };
        let messages = match seeded {
            Ok(messages) => messages,
            Err(e) => {
                self.apply(effects).await;
                return Err(e);
            }
        };
        info!(
            "[Client] ✅ 会话 room={} 加载完成，共 {} 条消息",
            room,
            messages.len()
        );
        self.apply(effects).await;
        Ok(messages)
    }

    async fn close_conversation(&self) {
        let mut effects = Effects::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.generation += 1;
            self.typing.flush().await;
            if self.typing.reset_peer() {
                effects.peer_typing = Some(false);
            }
            if let Some(previous) = state.active.take() {
                info!("[Client] 📪 关闭会话 room={}", previous.room);
                state.receipts.forget_reads(&previous.room);
                effects.messages = Some(Vec::new());
            }
            state.lifecycle.deactivate().await;
        }
        self.apply(effects).await;
    }

    async fn send(
        &self,
        text: Option<&str>,
        attachments: Vec<OutgoingAttachment>,
    ) -> Result<Message, SendError> {
        let me = self.config.user_id;
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if text.is_none() && attachments.is_empty() {
            return Err(SendError::EmptyPayload);
        }
        if let Some(rejected) = attachments.iter().find(|a| !a.is_allowed()) {
            warn!(
                "[Client] 🚫 拒绝附件 {} (类型: {})",
                rejected.filename, rejected.mime
            );
            return Err(SendError::UnsupportedAttachment(rejected.filename.clone()));
        }

        let (contact_id, room, session) = {
            let state = self.state.lock().await;
            let active = state
                .active
                .as_ref()
                .ok_or(SendError::NoActiveConversation)?;
            (active.contact_id, active.room.clone(), active.session)
        };

        self.typing.stop_now(room, me).await;
        let message = self
            .api
            .send_message(contact_id, text, &attachments)
            .await?;
        info!("[Client] 📤 消息已发送 id={}", message.id);

        let mut effects = Effects::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.contacts.record_outbound(contact_id, &message);
            effects.contacts = Some(state.contacts.entries().to_vec());
            match state.active.as_mut() {
                Some(active) if active.session == session => {
                    if active.store.append(message.clone()) {
                        effects.messages = Some(active.store.snapshot());
                    }
                }
                _ => info!(
                    "[Client] ⏭️ 会话已切换，消息 {} 不写入当前会话",
                    message.id
                ),
            }
        }
        self.apply(effects).await;
        Ok(message)
    }

    async fn set_visible(&self, visible: bool) {
        let me = self.config.user_id;
        let mut effects = Effects::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.visible = visible;
            debug!("[Client] 👁️ 会话视图可见: {}", visible);
            if visible {
                if let Some(active) = state.active.as_ref() {
                    effects.outbound = state.receipts.collect_reads(
                        active.store.iter(),
                        me,
                        active.contact_id,
                    );
                }
            }
        }
        self.apply(effects).await;
    }

    async fn refresh_contacts(&self) -> Result<Vec<ContactSnapshot>, FetchError> {
        let snapshot = self.api.get_contacts().await?;
        let contacts = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.contacts.replace(snapshot);
            if let Some(active) = state.active.as_ref() {
                state.contacts.mark_active(active.contact_id);
            }
            state.contacts.entries().to_vec()
        };
        self.apply(Effects {
            contacts: Some(contacts.clone()),
            ..Effects::default()
        })
        .await;
        Ok(contacts)
    }

    async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::MessageReceived(message) => self.handle_message(message).await,
            InboundEvent::StatusUpdated(update) => self.handle_status(update).await,
            InboundEvent::PeerTyping(_) | InboundEvent::PeerStopTyping(_) => {
                let changed = {
                    let state = self.state.lock().await;
                    state
                        .active
                        .as_ref()
                        .and_then(|a| self.typing.apply_remote(&event, a.contact_id))
                };
                self.apply(Effects {
                    peer_typing: changed,
                    ..Effects::default()
                })
                .await;
            }
        }
    }

    async fn handle_message(&self, message: Message) {
        let me = self.config.user_id;
        let mut effects = Effects::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let sighting = state.receipts.observe_incoming(&message, me);
            effects.outbound.extend(sighting.ack);

            let mut in_active = false;
            if let Some(active) = state.active.as_mut() {
                if message.belongs_to(me, active.contact_id) {
                    in_active = true;
                    if active.store.append(message.clone()) {
                        debug!("[Client] 📥 新消息 id={} room={}", message.id, active.room);
                        effects.messages = Some(active.store.snapshot());
                        if state.visible {
                            effects.outbound.extend(state.receipts.collect_reads(
                                std::iter::once(&message),
                                me,
                                active.contact_id,
                            ));
                        }
                    } else if let StatusChange::Applied(status) =
                        active.store.update_status(message.id, message.status)
                    {
                        effects.statuses.push((message.id, status));
                    }
                } else {
                    debug!(
                        "[Client] 消息 id={} 不属于当前会话 room={}",
                        message.id, active.room
                    );
                }
            }

            if message.is_from(me) {
                if let Some(receiver) = message.receiver_id {
                    state.contacts.record_outbound(receiver, &message);
                    effects.contacts = Some(state.contacts.entries().to_vec());
                }
            } else if sighting.first_seen {
                let contact = state.contacts.record_inbound(&message, in_active).clone();
                if !in_active && !contact.mute {
                    effects.unread = Some((contact, message.clone()));
                }
                effects.contacts = Some(state.contacts.entries().to_vec());
            }
        }
        self.apply(effects).await;
    }

    async fn handle_status(&self, update: StatusUpdate) {
        let mut effects = Effects::default();
        {
            let mut guard = self.state.lock().await;
            let Some(active) = guard.active.as_mut() else {
                return;
            };
            if update.room_id.as_ref().is_some_and(|r| *r != active.room) {
                debug!("[Client] 忽略其他房间的状态更新 id={}", update.message_id);
                return;
            }
            match active.store.update_status(update.message_id, update.status) {
                StatusChange::Applied(status) => {
                    debug!(
                        "[Client] ✔️ 消息 {} 状态更新为 {:?}",
                        update.message_id, status
                    );
                    effects.statuses.push((update.message_id, status));
                }
                StatusChange::Ignored => {}
                StatusChange::Unknown => {
                    debug!("[Client] 状态更新的消息 {} 不在当前会话", update.message_id)
                }
            }
        }
        self.apply(effects).await;
    }

    async fn handle_connection(&self, connected: bool) {
        {
            let mut state = self.state.lock().await;
            if connected {
                state.lifecycle.on_reconnected().await;
            } else {
                state.lifecycle.on_disconnected();
            }
        }
        self.listener().on_connection_status_changed(connected).await;
    }

    async fn apply(&self, effects: Effects) {
        for event in effects.outbound {
            let name = event.name();
            if let Err(e) = self.channel.emit(event).await {
                warn!("[Client] ⚠️ 发送事件 {} 失败: {}", name, e);
            }
        }

        let listener = self.listener();
        if let Some(messages) = effects.messages {
            listener.on_messages_changed(messages).await;
        }
        for (message_id, status) in effects.statuses {
            listener.on_message_status_changed(message_id, status).await;
        }
        if let Some(typing) = effects.peer_typing {
            listener.on_peer_typing_changed(typing).await;
        }
        if let Some(contacts) = effects.contacts {
            listener.on_contacts_changed(contacts).await;
        }
        if let Some((contact, message)) = effects.unread {
            info!(
                "[Client] 🔔 来自 {} 的新消息",
                contact.contact_user_name
            );
            listener.on_unread_message(contact, message).await;
        }
    }
}

/// 注册到事件通道上的处理函数，持有客户端的弱引用
struct ConversationEventHandler {
    inner: Weak<ClientInner>,
}

#[async_trait]
impl ChannelListener for ConversationEventHandler {
    async fn on_event(&self, event: InboundEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_event(event).await;
        }
    }

    async fn on_connection_status_changed(&self, connected: bool) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_connection(connected).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::channel::events::{Receipt, TypingSignal};
    use crate::im::channel::memory::MemoryChannel;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Once;

    static INIT_LOGGER: Once = Once::new();

    fn init_test_logger() {
        INIT_LOGGER.call_once(|| {
            use tracing_subscriber::prelude::*;
            use tracing_subscriber::EnvFilter;

            let filter_layer = EnvFilter::new("info,chat_sdk_core_rust=debug");
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_test_writer();

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        });
    }

    struct MockChatApi {
        me: UserId,
        histories: std::sync::Mutex<HashMap<UserId, Vec<Message>>>,
        delays: std::sync::Mutex<HashMap<UserId, Duration>>,
        contacts: std::sync::Mutex<Vec<ContactSnapshot>>,
        failing_history: std::sync::Mutex<HashSet<UserId>>,
        fail_send: AtomicBool,
        send_calls: AtomicUsize,
        next_id: AtomicU64,
    }

    impl MockChatApi {
        fn new(me: UserId) -> Self {
            Self {
                me,
                histories: Default::default(),
                delays: Default::default(),
                contacts: Default::default(),
                failing_history: Default::default(),
                fail_send: AtomicBool::new(false),
                send_calls: AtomicUsize::new(0),
                next_id: AtomicU64::new(500),
            }
        }

        fn set_history(&self, contact_id: UserId, messages: Vec<Message>) {
            self.histories.lock().unwrap().insert(contact_id, messages);
        }

        fn set_delay(&self, contact_id: UserId, delay: Duration) {
            self.delays.lock().unwrap().insert(contact_id, delay);
        }

        fn set_contacts(&self, contacts: Vec<ContactSnapshot>) {
            *self.contacts.lock().unwrap() = contacts;
        }

        fn fail_history(&self, contact_id: UserId) {
            self.failing_history.lock().unwrap().insert(contact_id);
        }
    }

    #[async_trait]
    impl ChatApi for MockChatApi {
        async fn get_messages(&self, contact_id: UserId) -> Result<Vec<Message>, FetchError> {
            let delay = self.delays.lock().unwrap().get(&contact_id).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing_history.lock().unwrap().contains(&contact_id) {
                return Err(FetchError::Server("history unavailable".to_string()));
            }
            Ok(self
                .histories
                .lock()
                .unwrap()
                .get(&contact_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_contact_detail(
            &self,
            _user_id: UserId,
            contact_id: UserId,
        ) -> Result<ContactDetail, FetchError> {
            Ok(ContactDetail {
                contact_list_id: Some(1),
                contact_user_id: contact_id,
                contact_user_name: format!("user{contact_id}"),
                mute: false,
                pin: false,
            })
        }

        async fn get_contacts(&self) -> Result<Vec<ContactSnapshot>, FetchError> {
            Ok(self.contacts.lock().unwrap().clone())
        }

        async fn send_message(
            &self,
            contact_id: UserId,
            text: Option<&str>,
            _attachments: &[OutgoingAttachment],
        ) -> Result<Message, FetchError> {
            self.send_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(FetchError::Server("send rejected".to_string()));
            }
            Ok(Message {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                sender_id: self.me,
                receiver_id: Some(contact_id),
                body: text.map(str::to_string),
                created_at: "2024-01-01T00:00:00Z".to_string(),
                status: MessageStatus::Sent,
                attachments: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        unread: std::sync::Mutex<Vec<UserId>>,
        typing: std::sync::Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl ConversationListener for Recorder {
        async fn on_messages_changed(&self, _messages: Vec<Message>) {}
        async fn on_message_status_changed(&self, _id: MessageId, _status: MessageStatus) {}
        async fn on_peer_typing_changed(&self, typing: bool) {
            self.typing.lock().unwrap().push(typing);
        }
        async fn on_contacts_changed(&self, _contacts: Vec<ContactSnapshot>) {}
        async fn on_unread_message(&self, contact: ContactSnapshot, _message: Message) {
            self.unread.lock().unwrap().push(contact.contact_user_id);
        }
        async fn on_connection_status_changed(&self, _connected: bool) {}
    }

    fn incoming(id: MessageId, sender_id: UserId, receiver_id: UserId) -> Message {
        Message {
            id,
            sender_id,
            receiver_id: Some(receiver_id),
            body: Some(format!("msg {id}")),
            created_at: String::new(),
            status: MessageStatus::Sent,
            attachments: Vec::new(),
        }
    }

    fn setup(me: UserId) -> (ChatClient, Arc<MockChatApi>, Arc<MemoryChannel>) {
        init_test_logger();
        let api = Arc::new(MockChatApi::new(me));
        let channel = Arc::new(MemoryChannel::new());
        let client = ChatClient::with_parts(ClientConfig::new(me, ""), api.clone(), channel.clone());
        (client, api, channel)
    }

    async fn ids(client: &ChatClient) -> Vec<MessageId> {
        client.messages().await.iter().map(|m| m.id).collect()
    }

    #[tokio::test]
    async fn opening_joins_room_and_acks_delivery() {
        let (client, _api, channel) = setup(7);
        client.open_conversation(42).await.unwrap();
        assert_eq!(
            channel.emitted(),
            vec![OutboundEvent::JoinRoom(RoomId::from("7_42"))]
        );
        assert_eq!(
            client.contact_detail().await.unwrap().contact_user_name,
            "user42"
        );

        channel
            .inject(InboundEvent::MessageReceived(incoming(101, 42, 7)))
            .await;

        assert_eq!(ids(&client).await, vec![101]);
        let emitted = channel.emitted();
        assert_eq!(
            emitted[1],
            OutboundEvent::MessageDelivered(Receipt {
                room_id: RoomId::from("7_42"),
                message_id: 101,
            })
        );
        assert!(emitted.contains(&OutboundEvent::MessageRead(Receipt {
            room_id: RoomId::from("7_42"),
            message_id: 101,
        })));
    }

    #[tokio::test]
    async fn empty_send_never_reaches_the_network() {
        let (client, api, channel) = setup(7);
        client.open_conversation(42).await.unwrap();
        channel.clear_emitted();

        assert!(matches!(
            client.send(None, Vec::new()).await,
            Err(SendError::EmptyPayload)
        ));
        assert!(matches!(
            client.send(Some("   "), Vec::new()).await,
            Err(SendError::EmptyPayload)
        ));
        assert_eq!(api.send_calls.load(Ordering::SeqCst), 0);
        assert!(channel.emitted().is_empty());
        assert!(client.messages().await.is_empty());
    }

    #[tokio::test]
    async fn unsupported_attachment_is_rejected() {
        let (client, api, _channel) = setup(7);
        client.open_conversation(42).await.unwrap();
        let exe = OutgoingAttachment::new("setup.exe", "application/octet-stream", vec![0]);
        assert!(matches!(
            client.send(None, vec![exe]).await,
            Err(SendError::UnsupportedAttachment(name)) if name == "setup.exe"
        ));
        assert_eq!(api.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn send_without_conversation_fails() {
        let (client, _api, _channel) = setup(7);
        assert!(matches!(
            client.send(Some("hi"), Vec::new()).await,
            Err(SendError::NoActiveConversation)
        ));
    }

    #[tokio::test]
    async fn send_appends_once_and_status_only_moves_forward() {
        let (client, _api, channel) = setup(7);
        client.open_conversation(42).await.unwrap();
        client.input_changed().await;

        let sent = client.send(Some("hello"), Vec::new()).await.unwrap();
        assert_eq!(ids(&client).await, vec![sent.id]);
        assert!(channel
            .emitted()
            .iter()
            .any(|e| matches!(e, OutboundEvent::StopTyping(_))));

        // 服务器回显同一条消息
        channel
            .inject(InboundEvent::MessageReceived(sent.clone()))
            .await;
        assert_eq!(ids(&client).await, vec![sent.id]);

        let update = |status| {
            InboundEvent::StatusUpdated(StatusUpdate {
                message_id: sent.id,
                status,
                room_id: Some(RoomId::from("7_42")),
            })
        };
        channel.inject(update(MessageStatus::Delivered)).await;
        assert_eq!(
            client.message_status(sent.id).await,
            Some(MessageStatus::Delivered)
        );
        channel.inject(update(MessageStatus::Read)).await;
        channel.inject(update(MessageStatus::Delivered)).await;
        assert_eq!(
            client.message_status(sent.id).await,
            Some(MessageStatus::Read)
        );
    }

    #[tokio::test]
    async fn switching_leaves_before_join_and_drops_stale_messages() {
        let (client, _api, channel) = setup(1);
        client.open_conversation(2).await.unwrap();
        client.open_conversation(3).await.unwrap();

        assert_eq!(
            channel.emitted(),
            vec![
                OutboundEvent::JoinRoom(RoomId::from("1_2")),
                OutboundEvent::LeaveRoom(RoomId::from("1_2")),
                OutboundEvent::JoinRoom(RoomId::from("1_3")),
            ]
        );

        channel
            .inject(InboundEvent::MessageReceived(incoming(9, 2, 1)))
            .await;
        assert!(client.messages().await.is_empty());
        assert_eq!(client.active_contact().await, Some(3));

        let contacts = client.contacts().await;
        let stale = contacts.iter().find(|c| c.contact_user_id == 2).unwrap();
        assert_eq!(stale.pending, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_seed_is_discarded() {
        let (client, api, _channel) = setup(1);
        api.set_history(2, vec![incoming(10, 2, 1)]);
        api.set_delay(2, Duration::from_millis(500));
        api.set_history(3, vec![incoming(20, 3, 1)]);

        let slow = tokio::spawn({
            let client = client.clone();
            async move { client.open_conversation(2).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.open_conversation(3).await.unwrap();

        let res = slow.await.unwrap();
        assert!(matches!(res, Err(FetchError::Superseded(2))));
        assert_eq!(ids(&client).await, vec![20]);
    }

    #[tokio::test]
    async fn reconnect_rejoins_and_deduplicates() {
        let (client, api, channel) = setup(7);
        api.set_history(42, vec![incoming(101, 42, 7)]);
        client.open_conversation(42).await.unwrap();
        let delivered = channel
            .emitted()
            .iter()
            .filter(|e| matches!(e, OutboundEvent::MessageDelivered(_)))
            .count();
        assert_eq!(delivered, 1);

        channel.drop_connection().await;
        channel.restore_connection().await;
        channel.clear_emitted();

        channel
            .inject(InboundEvent::MessageReceived(incoming(101, 42, 7)))
            .await;
        assert_eq!(ids(&client).await, vec![101]);
        assert!(channel.emitted().is_empty());
    }

    #[tokio::test]
    async fn reconnect_emits_join_again() {
        let (client, _api, channel) = setup(7);
        client.open_conversation(42).await.unwrap();
        channel.drop_connection().await;
        channel.restore_connection().await;
        assert_eq!(
            channel.emitted(),
            vec![
                OutboundEvent::JoinRoom(RoomId::from("7_42")),
                OutboundEvent::JoinRoom(RoomId::from("7_42")),
            ]
        );
    }

    #[tokio::test]
    async fn hidden_view_defers_read_acks() {
        let (client, _api, channel) = setup(7);
        client.open_conversation(42).await.unwrap();
        client.set_visible(false).await;

        channel
            .inject(InboundEvent::MessageReceived(incoming(101, 42, 7)))
            .await;
        let reads = |channel: &MemoryChannel| {
            channel
                .emitted()
                .iter()
                .filter(|e| matches!(e, OutboundEvent::MessageRead(_)))
                .count()
        };
        assert_eq!(reads(&channel), 0);

        client.set_visible(true).await;
        assert_eq!(reads(&channel), 1);
        client.set_visible(true).await;
        assert_eq!(reads(&channel), 1);
    }

    #[tokio::test]
    async fn peer_typing_follows_active_peer_and_resets_on_switch() {
        let (client, _api, channel) = setup(7);
        let recorder = Arc::new(Recorder::default());
        client.set_listener(recorder.clone());
        client.open_conversation(42).await.unwrap();

        channel.inject(InboundEvent::PeerTyping(3)).await;
        assert!(!client.is_peer_typing());
        channel.inject(InboundEvent::PeerTyping(42)).await;
        assert!(client.is_peer_typing());

        client.open_conversation(3).await.unwrap();
        assert!(!client.is_peer_typing());
        assert_eq!(*recorder.typing.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn unread_hook_skips_active_and_muted_contacts() {
        let (client, api, channel) = setup(7);
        let recorder = Arc::new(Recorder::default());
        client.set_listener(recorder.clone());
        api.set_contacts(vec![
            ContactSnapshot {
                pending: 2,
                is_saved: true,
                ..ContactSnapshot::placeholder(42)
            },
            ContactSnapshot {
                mute: true,
                is_saved: true,
                ..ContactSnapshot::placeholder(5)
            },
        ]);
        client.refresh_contacts().await.unwrap();
        client.open_conversation(42).await.unwrap();
        assert_eq!(client.contacts().await[0].pending, 0);

        channel
            .inject(InboundEvent::MessageReceived(incoming(1, 42, 7)))
            .await;
        channel
            .inject(InboundEvent::MessageReceived(incoming(2, 5, 7)))
            .await;
        channel
            .inject(InboundEvent::MessageReceived(incoming(3, 8, 7)))
            .await;

        assert_eq!(*recorder.unread.lock().unwrap(), vec![8]);
        let contacts = client.contacts().await;
        assert_eq!(contacts.len(), 3);
        assert_eq!(contacts[0].pending, 0);
        assert_eq!(contacts[1].pending, 1);
        assert!(!contacts[2].is_saved);
    }

    #[tokio::test]
    async fn shutdown_leaves_room_and_unregisters() {
        let (client, _api, channel) = setup(7);
        client.open_conversation(42).await.unwrap();
        client.shutdown().await;
        assert_eq!(
            channel.emitted().last(),
            Some(&OutboundEvent::LeaveRoom(RoomId::from("7_42")))
        );
        channel
            .inject(InboundEvent::MessageReceived(incoming(1, 42, 7)))
            .await;
        assert!(client.contacts().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_delivery_counts_once_for_inactive_contact() {
        let (client, _api, channel) = setup(7);
        let recorder = Arc::new(Recorder::default());
        client.set_listener(recorder.clone());
        client.open_conversation(42).await.unwrap();

        channel
            .inject(InboundEvent::MessageReceived(incoming(9, 5, 7)))
            .await;
        channel.drop_connection().await;
        channel.restore_connection().await;
        channel
            .inject(InboundEvent::MessageReceived(incoming(9, 5, 7)))
            .await;

        let contacts = client.contacts().await;
        let other = contacts.iter().find(|c| c.contact_user_id == 5).unwrap();
        assert_eq!(other.pending, 1);
        assert_eq!(client.total_pending().await, 1);
        assert_eq!(*recorder.unread.lock().unwrap(), vec![5]);
        let delivered = channel
            .emitted()
            .iter()
            .filter(|e| matches!(e, OutboundEvent::MessageDelivered(_)))
            .count();
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn failed_seed_returns_error_and_leaves_store_empty() {
        let (client, api, _channel) = setup(7);
        api.fail_history(42);

        let res = client.open_conversation(42).await;
        assert!(matches!(res, Err(FetchError::Server(_))));
        assert!(client.messages().await.is_empty());
        assert_eq!(client.active_contact().await, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_seed_discards_live_arrivals() {
        let (client, api, channel) = setup(7);
        api.fail_history(42);
        api.set_delay(42, Duration::from_millis(500));

        let opening = tokio::spawn({
            let client = client.clone();
            async move { client.open_conversation(42).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        channel
            .inject(InboundEvent::MessageReceived(incoming(101, 42, 7)))
            .await;
        assert_eq!(ids(&client).await, vec![101]);

        let res = opening.await.unwrap();
        assert!(matches!(res, Err(FetchError::Server(_))));
        assert!(client.messages().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_seed_after_switch_is_superseded() {
        let (client, api, _channel) = setup(1);
        api.fail_history(2);
        api.set_delay(2, Duration::from_millis(500));
        api.set_history(3, vec![incoming(20, 3, 1)]);

        let slow = tokio::spawn({
            let client = client.clone();
            async move { client.open_conversation(2).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.open_conversation(3).await.unwrap();

        let res = slow.await.unwrap();
        assert!(matches!(res, Err(FetchError::Superseded(2))));
        assert_eq!(ids(&client).await, vec![20]);
    }

    #[tokio::test]
    async fn failed_send_leaves_store_and_contacts_untouched() {
        let (client, api, _channel) = setup(7);
        api.set_contacts(vec![ContactSnapshot {
            is_saved: true,
            ..ContactSnapshot::placeholder(42)
        }]);
        client.refresh_contacts().await.unwrap();
        client.open_conversation(42).await.unwrap();
        let before = client.contacts().await;
        api.fail_send.store(true, Ordering::SeqCst);

        let res = client.send(Some("hello"), Vec::new()).await;
        assert!(matches!(
            res,
            Err(SendError::Transport(FetchError::Server(_)))
        ));
        assert_eq!(api.send_calls.load(Ordering::SeqCst), 1);
        assert!(client.messages().await.is_empty());
        assert_eq!(client.contacts().await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_stop_precedes_leave_when_switching() {
        let (client, _api, channel) = setup(1);
        client.open_conversation(2).await.unwrap();

        let (_, opened) = tokio::join!(client.input_changed(), client.open_conversation(3));
        opened.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let signal = TypingSignal {
            room_id: RoomId::from("1_2"),
            user_id: 1,
        };
        assert_eq!(
            channel.emitted(),
            vec![
                OutboundEvent::JoinRoom(RoomId::from("1_2")),
                OutboundEvent::Typing(signal.clone()),
                OutboundEvent::StopTyping(signal),
                OutboundEvent::LeaveRoom(RoomId::from("1_2")),
                OutboundEvent::JoinRoom(RoomId::from("1_3")),
            ]
        );
    }
}
