//! 输入状态协调器
//!
//! 本地输入：每次输入立即发送 `typing`，并重新计时；安静期结束后只发送
//! 一次 `stop_typing`（防抖，从最后一次输入开始计时）。
//! 对端输入：只接受当前会话对端的信号，切换会话时重置为 false。

use crate::im::channel::events::{InboundEvent, OutboundEvent, TypingSignal};
use crate::im::channel::EventChannel;
use crate::im::room::RoomId;
use crate::im::types::UserId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 默认的 stop_typing 延迟
pub const DEFAULT_TYPING_STOP_DELAY: Duration = Duration::from_millis(1000);

struct PendingStop {
    signal: TypingSignal,
    handle: JoinHandle<()>,
}

pub struct TypingCoordinator {
    channel: Arc<dyn EventChannel>,
    stop_delay: Duration,
    pending: Mutex<Option<PendingStop>>,
    peer_typing: AtomicBool,
}

impl TypingCoordinator {
    pub fn new(channel: Arc<dyn EventChannel>, stop_delay: Duration) -> Self {
        Self {
            channel,
            stop_delay,
            pending: Mutex::new(None),
            peer_typing: AtomicBool::new(false),
        }
    }

    /// 本地输入变化
    pub async fn input_changed(&self, room: RoomId, user_id: UserId) {
        let signal = TypingSignal {
            room_id: room,
            user_id,
        };
        if let Err(e) = self
            .channel
            .emit(OutboundEvent::Typing(signal.clone()))
            .await
        {
            warn!("[Typing] ⚠️ 发送 typing 失败: {}", e);
        }
        self.arm(signal);
    }

    /// 取消旧计时器并重新计时
    fn arm(&self, signal: TypingSignal) {
        let channel = self.channel.clone();
        let delay = self.stop_delay;
        let stop = signal.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("[Typing] ⌨️ 安静期结束，发送 stop_typing room={}", stop.room_id);
            if let Err(e) = channel.emit(OutboundEvent::StopTyping(stop)).await {
                warn!("[Typing] ⚠️ 发送 stop_typing 失败: {}", e);
            }
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(PendingStop { signal, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    fn take_pending(&self) -> Option<PendingStop> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// 是否有尚未触发的 stop_typing
    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// 发送消息时调用：取消计时器并立即发送 stop_typing
    pub async fn stop_now(&self, room: RoomId, user_id: UserId) {
        if let Some(pending) = self.take_pending() {
            pending.handle.abort();
        }
        let signal = TypingSignal {
            room_id: room,
            user_id,
        };
        if let Err(e) = self.channel.emit(OutboundEvent::StopTyping(signal)).await {
            warn!("[Typing] ⚠️ 发送 stop_typing 失败: {}", e);
        }
    }

    /// 切换会话时调用：计时器仍在等待则立即补发 stop_typing
    pub async fn flush(&self) {
        let Some(pending) = self.take_pending() else {
            return;
        };
        if pending.handle.is_finished() {
            return;
        }
        pending.handle.abort();
        if let Err(e) = self
            .channel
            .emit(OutboundEvent::StopTyping(pending.signal))
            .await
        {
            warn!("[Typing] ⚠️ 发送 stop_typing 失败: {}", e);
        }
    }

    /// 处理对端输入事件，状态发生变化时返回新值
    pub fn apply_remote(&self, event: &InboundEvent, active_peer: UserId) -> Option<bool> {
        let (sender, typing) = match event {
            InboundEvent::PeerTyping(sender) => (*sender, true),
            InboundEvent::PeerStopTyping(sender) => (*sender, false),
            _ => return None,
        };
        if sender != active_peer {
            debug!("[Typing] 忽略非当前会话的输入状态 sender={}", sender);
            return None;
        }
        let previous = self.peer_typing.swap(typing, Ordering::SeqCst);
        (previous != typing).then_some(typing)
    }

    pub fn is_peer_typing(&self) -> bool {
        self.peer_typing.load(Ordering::SeqCst)
    }

    /// 切换会话时重置对端输入状态，返回之前是否为 true
    pub fn reset_peer(&self) -> bool {
        self.peer_typing.swap(false, Ordering::SeqCst)
    }
}

impl Drop for TypingCoordinator {
    fn drop(&mut self) {
        if let Some(pending) = self.take_pending() {
            pending.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::channel::memory::MemoryChannel;
    use tokio::time::{sleep, Instant};

    async fn setup() -> (Arc<MemoryChannel>, TypingCoordinator) {
        let channel = Arc::new(MemoryChannel::new());
        channel.connect().await.unwrap();
        let typing = TypingCoordinator::new(channel.clone(), DEFAULT_TYPING_STOP_DELAY);
        (channel, typing)
    }

    fn stops(channel: &MemoryChannel) -> Vec<Instant> {
        channel
            .emitted_at()
            .into_iter()
            .filter(|(_, e)| matches!(e, OutboundEvent::StopTyping(_)))
            .map(|(t, _)| t)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn burst_produces_one_stop_timed_from_last_input() {
        let (channel, typing) = setup().await;
        let room = RoomId::between(7, 42);
        let start = Instant::now();

        for _ in 0..5 {
            typing.input_changed(room.clone(), 7).await;
            sleep(Duration::from_millis(300)).await;
        }
        // 最后一次输入发生在 1200ms
        sleep(Duration::from_millis(2000)).await;

        let typing_count = channel
            .emitted()
            .iter()
            .filter(|e| matches!(e, OutboundEvent::Typing(_)))
            .count();
        assert_eq!(typing_count, 5);

        let stops = stops(&channel);
        assert_eq!(stops.len(), 1);
        let elapsed = stops[0] - start;
        assert!(elapsed >= Duration::from_millis(2200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2300), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_each_get_a_stop() {
        let (channel, typing) = setup().await;
        let room = RoomId::between(1, 2);
        typing.input_changed(room.clone(), 1).await;
        sleep(Duration::from_millis(1500)).await;
        typing.input_changed(room.clone(), 1).await;
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(stops(&channel).len(), 2);
        assert!(!typing.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_now_cancels_the_timer() {
        let (channel, typing) = setup().await;
        let room = RoomId::between(1, 2);
        typing.input_changed(room.clone(), 1).await;
        typing.stop_now(room, 1).await;
        sleep(Duration::from_millis(3000)).await;
        assert_eq!(stops(&channel).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_emits_pending_stop_once() {
        let (channel, typing) = setup().await;
        typing.input_changed(RoomId::between(1, 2), 1).await;
        assert!(typing.is_armed());
        typing.flush().await;
        typing.flush().await;
        sleep(Duration::from_millis(3000)).await;
        assert_eq!(stops(&channel).len(), 1);
    }

    #[tokio::test]
    async fn remote_signals_only_from_active_peer() {
        let (_channel, typing) = setup().await;
        assert_eq!(typing.apply_remote(&InboundEvent::PeerTyping(3), 42), None);
        assert!(!typing.is_peer_typing());

        assert_eq!(typing.apply_remote(&InboundEvent::PeerTyping(42), 42), Some(true));
        assert_eq!(typing.apply_remote(&InboundEvent::PeerTyping(42), 42), None);
        assert!(typing.is_peer_typing());

        assert_eq!(
            typing.apply_remote(&InboundEvent::PeerStopTyping(42), 42),
            Some(false)
        );
        typing.apply_remote(&InboundEvent::PeerTyping(42), 42);
        assert!(typing.reset_peer());
        assert!(!typing.is_peer_typing());
    }
}
