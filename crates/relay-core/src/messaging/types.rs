use std::time::Duration;

use crate::domain::{ChatId, MessageId, MessageRef, UpdateId, UserId};

/// One remote-origin event.
///
/// `id` comes from the source and is never re-derived; the payload is keyed by kind
/// so dispatch is a plain exhaustive match.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub id: UpdateId,
    pub kind: UpdateKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UpdateKind {
    Message(ChatMessage),
    EditedMessage(ChatMessage),
    ChannelPost(ChatMessage),
    EditedChannelPost(ChatMessage),
    InlineQuery(InlineQuery),
    ChosenInlineResult(ChosenInlineResult),
    CallbackQuery(CallbackQuery),
    ShippingQuery(ShippingQuery),
    PreCheckoutQuery(PreCheckoutQuery),
    /// Anything the wire bindings do not model (polls, member updates, undecodable payloads).
    Other { kind: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InlineQuery {
    pub query_id: String,
    pub user_id: UserId,
    pub query: String,
    pub offset: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChosenInlineResult {
    pub result_id: String,
    pub user_id: UserId,
    pub query: String,
    pub inline_message_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallbackQuery {
    pub callback_id: String,
    pub user_id: UserId,
    pub username: Option<String>,
    pub data: Option<String>,
    pub message: Option<MessageRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShippingQuery {
    pub query_id: String,
    pub user_id: UserId,
    pub invoice_payload: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreCheckoutQuery {
    pub query_id: String,
    pub user_id: UserId,
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
}

impl UpdateKind {
    /// Bot API name of the kind (`message`, `callback_query`, ...).
    pub fn name(&self) -> &str {
        match self {
            UpdateKind::Message(_) => "message",
            UpdateKind::EditedMessage(_) => "edited_message",
            UpdateKind::ChannelPost(_) => "channel_post",
            UpdateKind::EditedChannelPost(_) => "edited_channel_post",
            UpdateKind::InlineQuery(_) => "inline_query",
            UpdateKind::ChosenInlineResult(_) => "chosen_inline_result",
            UpdateKind::CallbackQuery(_) => "callback_query",
            UpdateKind::ShippingQuery(_) => "shipping_query",
            UpdateKind::PreCheckoutQuery(_) => "pre_checkout_query",
            UpdateKind::Other { kind } => kind,
        }
    }
}

impl Update {
    pub fn new(id: i64, kind: UpdateKind) -> Self {
        Self {
            id: UpdateId(id),
            kind,
        }
    }

    /// Text stored alongside the dedup marker. Diagnostics only.
    pub fn snapshot(&self) -> String {
        let text = match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => m.text.as_deref(),
            UpdateKind::InlineQuery(q) => Some(q.query.as_str()),
            UpdateKind::ChosenInlineResult(r) => Some(r.query.as_str()),
            UpdateKind::CallbackQuery(q) => q.data.as_deref(),
            UpdateKind::ShippingQuery(q) => Some(q.invoice_payload.as_str()),
            UpdateKind::PreCheckoutQuery(q) => Some(q.invoice_payload.as_str()),
            UpdateKind::Other { .. } => None,
        };
        text.unwrap_or_default().to_string()
    }
}

/// Updates returned by one fetch call, in arrival order.
pub type Batch = Vec<Update>;

/// Parameters of one long-poll fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchWindow {
    /// `None` lets the source use its own cursor.
    pub offset: Option<i64>,
    pub limit: u32,
    /// Server-side wait bound.
    pub timeout: Duration,
    pub allowed_updates: Vec<String>,
}

impl Default for FetchWindow {
    fn default() -> Self {
        Self {
            offset: None,
            limit: 5,
            timeout: Duration::from_secs(1),
            allowed_updates: vec![
                "message".to_string(),
                "callback_query".to_string(),
                "inline_query".to_string(),
            ],
        }
    }
}

/// Outgoing "chat action" shown while a reply is on its way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

impl ChatAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatAction::Typing => "typing",
        }
    }
}

/// Inline keyboard attached to a reply. Rows of buttons.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    /// All buttons on a single row.
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        if buttons.is_empty() {
            return Self::default();
        }
        Self {
            rows: vec![buttons],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }
}

/// A one-shot outbound effect derived from an update. Never persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundAction {
    ChatAction {
        chat_id: ChatId,
        action: ChatAction,
    },
    Reply {
        chat_id: ChatId,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    AnswerCallback {
        callback_id: String,
        text: Option<String>,
    },
    AnswerInline {
        query_id: String,
        results: Vec<serde_json::Value>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    ChatAction,
    Reply,
    AnswerCallback,
    AnswerInline,
}

impl OutboundAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            OutboundAction::ChatAction { .. } => ActionKind::ChatAction,
            OutboundAction::Reply { .. } => ActionKind::Reply,
            OutboundAction::AnswerCallback { .. } => ActionKind::AnswerCallback,
            OutboundAction::AnswerInline { .. } => ActionKind::AnswerInline,
        }
    }

    /// Chat the action lands in, when it has one (used for per-chat throttling).
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            OutboundAction::ChatAction { chat_id, .. } | OutboundAction::Reply { chat_id, .. } => {
                Some(*chat_id)
            }
            OutboundAction::AnswerCallback { .. } | OutboundAction::AnswerInline { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(text: Option<&str>) -> ChatMessage {
        ChatMessage {
            chat_id: ChatId(7),
            message_id: MessageId(1),
            user_id: Some(UserId(42)),
            username: None,
            text: text.map(|s| s.to_string()),
        }
    }

    #[test]
    fn snapshot_uses_primary_text_per_kind() {
        let msg = Update::new(1, UpdateKind::Message(text_message(Some("hi"))));
        assert_eq!(msg.snapshot(), "hi");

        let cb = Update::new(
            2,
            UpdateKind::CallbackQuery(CallbackQuery {
                callback_id: "cb".to_string(),
                user_id: UserId(42),
                username: None,
                data: Some("yes my boy!".to_string()),
                message: None,
            }),
        );
        assert_eq!(cb.snapshot(), "yes my boy!");

        let photo = Update::new(3, UpdateKind::Message(text_message(None)));
        assert_eq!(photo.snapshot(), "");

        let other = Update::new(
            4,
            UpdateKind::Other {
                kind: "poll".to_string(),
            },
        );
        assert_eq!(other.snapshot(), "");
        assert_eq!(other.kind.name(), "poll");
    }

    #[test]
    fn single_row_keyboard_drops_empty_rows() {
        assert!(InlineKeyboard::single_row(vec![]).is_empty());
        let kb = InlineKeyboard::single_row(vec![InlineButton {
            label: "yes".to_string(),
            callback_data: "y".to_string(),
        }]);
        assert_eq!(kb.rows.len(), 1);
        assert!(!kb.is_empty());
    }
}
