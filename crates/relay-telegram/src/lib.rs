//! Telegram adapter.
//!
//! Implements the `relay-core` ports over the Bot API: `TelegramSource` long-polls
//! `getUpdates`, `TelegramMessenger` sends the outbound actions. Both share one
//! `BotApi` client, so the proxy setting applies to every call.

use async_trait::async_trait;
use serde::Serialize;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tokio::sync::Mutex;

pub mod api;
pub mod convert;
pub mod router;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef, UpdateId},
    errors::Error,
    messaging::{
        port::{ActionEmitter, UpdateSource},
        types::{Batch, ChatAction, FetchWindow, InlineKeyboard},
    },
    Result,
};

use crate::api::BotApi;

#[derive(Clone)]
pub struct TelegramMessenger {
    api: BotApi,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct SendChatAction {
    chat_id: i64,
    action: &'static str,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Serialize)]
struct AnswerInlineQuery<'a> {
    inline_query_id: &'a str,
    results: &'a [serde_json::Value],
}

impl TelegramMessenger {
    pub fn new(api: BotApi) -> Self {
        Self { api }
    }

    fn markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| {
                        InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone())
                    })
                    .collect()
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }
}

#[async_trait]
impl ActionEmitter for TelegramMessenger {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        let payload = SendMessage {
            chat_id: chat_id.0,
            text,
            reply_markup: keyboard.filter(|k| !k.is_empty()).map(Self::markup),
        };
        let msg: serde_json::Value = self.api.call("sendMessage", &payload).await?;

        let message_id = msg
            .get("message_id")
            .and_then(|v| v.as_i64())
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| Error::Remote {
                code: 200,
                description: "sendMessage: result without message_id".to_string(),
            })?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(message_id),
        })
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let _: bool = self
            .api
            .call(
                "sendChatAction",
                &SendChatAction {
                    chat_id: chat_id.0,
                    action: action.as_str(),
                },
            )
            .await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let _: bool = self
            .api
            .call(
                "answerCallbackQuery",
                &AnswerCallbackQuery {
                    callback_query_id: callback_id,
                    text,
                },
            )
            .await?;
        Ok(())
    }

    async fn answer_inline_query(
        &self,
        query_id: &str,
        results: &[serde_json::Value],
    ) -> Result<()> {
        let _: bool = self
            .api
            .call(
                "answerInlineQuery",
                &AnswerInlineQuery {
                    inline_query_id: query_id,
                    results,
                },
            )
            .await?;
        Ok(())
    }
}

/// Fetch offset policy for `getUpdates`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Always request the trailing N updates (negative offset). Nothing is ever
    /// confirmed to Telegram; the dedup store filters the repeats.
    Trailing(i64),
    /// Request from the given offset; move past updates only once they are
    /// skipped or marked.
    Advancing(Option<i64>),
}

impl Cursor {
    pub fn from_offset(offset: i64) -> Self {
        match offset {
            o if o < 0 => Cursor::Trailing(o),
            0 => Cursor::Advancing(None),
            o => Cursor::Advancing(Some(o)),
        }
    }

    fn offset(&self) -> Option<i64> {
        match self {
            Cursor::Trailing(o) => Some(*o),
            Cursor::Advancing(o) => *o,
        }
    }

    /// Telegram drops every update below the next offset, so the cursor stops at
    /// the first id that still needs a marker.
    fn commit(&mut self, done: &[UpdateId], retry: &[UpdateId]) {
        let Cursor::Advancing(next) = self else {
            return;
        };
        let target = match retry.iter().min() {
            Some(first_unmarked) => Some(first_unmarked.0),
            None => done.iter().max().map(|id| id.0 + 1),
        };
        if let Some(target) = target {
            if next.map_or(true, |n| target > n) {
                *next = Some(target);
            }
        }
    }
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    limit: u32,
    timeout: u64,
    allowed_updates: &'a [String],
}

pub struct TelegramSource {
    api: BotApi,
    cursor: Mutex<Cursor>,
}

impl TelegramSource {
    pub fn new(api: BotApi, cursor: Cursor) -> Self {
        Self {
            api,
            cursor: Mutex::new(cursor),
        }
    }

    pub async fn cursor(&self) -> Cursor {
        *self.cursor.lock().await
    }
}

#[async_trait]
impl UpdateSource for TelegramSource {
    async fn fetch(&self, window: &FetchWindow) -> Result<Batch> {
        let cursor = self.cursor.lock().await;
        let payload = GetUpdates {
            offset: window.offset.or_else(|| cursor.offset()),
            limit: window.limit,
            timeout: window.timeout.as_secs(),
            allowed_updates: &window.allowed_updates,
        };

        let raw: Vec<serde_json::Value> = self
            .api
            .call_with_timeout(
                "getUpdates",
                &payload,
                window.timeout + self.api.request_timeout(),
            )
            .await?;

        let batch: Batch = raw
            .into_iter()
            .filter_map(convert::update_from_value)
            .collect();

        tracing::debug!(offset = ?payload.offset, fetched = batch.len(), "getUpdates");
        Ok(batch)
    }

    async fn commit(&self, done: &[UpdateId], retry: &[UpdateId]) {
        let mut cursor = self.cursor.lock().await;
        cursor.commit(done, retry);
        tracing::debug!(cursor = ?*cursor, retry = retry.len(), "cursor committed");
    }
}
