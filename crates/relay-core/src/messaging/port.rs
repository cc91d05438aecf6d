use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UpdateId},
    messaging::types::{Batch, ChatAction, FetchWindow, InlineKeyboard, OutboundAction},
    Result,
};

/// Long-poll source of updates.
///
/// Cursor state belongs to the implementation; the pipeline treats the batch opaquely.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Blocks up to `window.timeout` server-side. An empty batch is not an error.
    async fn fetch(&self, window: &FetchWindow) -> Result<Batch>;

    /// Called once the marks of a fetched batch are joined. `done` ids were skipped
    /// or marked; `retry` ids failed to mark and must be fetched again.
    ///
    /// Never called for a cycle that failed before forking marks.
    async fn commit(&self, _done: &[UpdateId], _retry: &[UpdateId]) {}
}

/// Outbound port, one operation per action kind.
///
/// Each call is independent: no ordering is implied between calls made in the same cycle.
#[async_trait]
pub trait ActionEmitter: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    async fn answer_inline_query(
        &self,
        query_id: &str,
        results: &[serde_json::Value],
    ) -> Result<()>;

    async fn emit(&self, action: &OutboundAction) -> Result<()> {
        match action {
            OutboundAction::ChatAction { chat_id, action } => {
                self.send_chat_action(*chat_id, *action).await
            }
            OutboundAction::Reply {
                chat_id,
                text,
                keyboard,
            } => self
                .send_message(*chat_id, text, keyboard.as_ref())
                .await
                .map(|_| ()),
            OutboundAction::AnswerCallback { callback_id, text } => {
                self.answer_callback_query(callback_id, text.as_deref())
                    .await
            }
            OutboundAction::AnswerInline { query_id, results } => {
                self.answer_inline_query(query_id, results).await
            }
        }
    }
}
