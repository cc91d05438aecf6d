use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::ActionEmitter,
        types::{ChatAction, InlineKeyboard},
    },
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// ActionEmitter decorator that spaces out outbound calls.
///
/// Only waits; a call rejected by the remote is reported as-is and never retried here.
pub struct ThrottledEmitter {
    inner: Arc<dyn ActionEmitter>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledEmitter {
    pub fn new(inner: Arc<dyn ActionEmitter>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        if !map.contains_key(&chat_id) {
            // Limiters whose slot is already free hold no state worth keeping.
            let now = Instant::now();
            map.retain(|_, lim| lim.try_lock().map_or(true, |l| l.next > now));
        }
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    /// Chat-scoped calls wait for both the chat slot and the global slot.
    async fn wait_for_chat(&self, chat_id: ChatId) {
        let global = self.global.lock().await.reserve();
        let chat = {
            let lim = self.limiter_for_chat(chat_id.0).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };
        pause(global.max(chat)).await;
    }

    async fn wait_global(&self) {
        let global = self.global.lock().await.reserve();
        pause(global).await;
    }
}

async fn pause(wait: Duration) {
    if !wait.is_zero() {
        sleep(wait).await;
    }
}

#[async_trait::async_trait]
impl ActionEmitter for ThrottledEmitter {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        self.wait_for_chat(chat_id).await;
        self.inner.send_message(chat_id, text, keyboard).await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.wait_for_chat(chat_id).await;
        self.inner.send_chat_action(chat_id, action).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // No chat here; global slot only.
        self.wait_global().await;
        self.inner.answer_callback_query(callback_id, text).await
    }

    async fn answer_inline_query(
        &self,
        query_id: &str,
        results: &[serde_json::Value],
    ) -> Result<()> {
        self.wait_global().await;
        self.inner.answer_inline_query(query_id, results).await
    }
}
