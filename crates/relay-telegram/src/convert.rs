//! Telegram wire payloads (teloxide bindings) → core update model.

use teloxide::types as tg;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{
        CallbackQuery, ChatMessage, ChosenInlineResult, InlineQuery, PreCheckoutQuery,
        ShippingQuery, Update, UpdateKind,
    },
};

/// Decode one element of `getUpdates.result`.
///
/// Returns `None` only when there is no usable `update_id`. A payload the bindings
/// cannot decode still yields an `Other` update so its id gets marked.
pub fn update_from_value(raw: serde_json::Value) -> Option<Update> {
    let id = raw.get("update_id")?.as_i64()?;
    let kind_name = raw
        .as_object()
        .and_then(|o| o.keys().find(|k| k.as_str() != "update_id").cloned())
        .unwrap_or_else(|| "unknown".to_string());

    // teloxide's `Update` visitor only decodes from text; from a `Value` every kind
    // comes back as `UpdateKind::Error`.
    let kind = match serde_json::from_str::<tg::Update>(&raw.to_string()) {
        Ok(update) => convert_kind(update.kind).unwrap_or(UpdateKind::Other { kind: kind_name }),
        Err(e) => {
            tracing::warn!(update_id = id, kind = %kind_name, error = %e, "undecodable update");
            UpdateKind::Other { kind: kind_name }
        }
    };

    Some(Update::new(id, kind))
}

fn convert_kind(kind: tg::UpdateKind) -> Option<UpdateKind> {
    let out = match kind {
        tg::UpdateKind::Message(m) => UpdateKind::Message(chat_message(&m)),
        tg::UpdateKind::EditedMessage(m) => UpdateKind::EditedMessage(chat_message(&m)),
        tg::UpdateKind::ChannelPost(m) => UpdateKind::ChannelPost(chat_message(&m)),
        tg::UpdateKind::EditedChannelPost(m) => UpdateKind::EditedChannelPost(chat_message(&m)),
        tg::UpdateKind::InlineQuery(q) => UpdateKind::InlineQuery(InlineQuery {
            query_id: q.id,
            user_id: user_id(&q.from),
            query: q.query,
            offset: q.offset,
        }),
        tg::UpdateKind::ChosenInlineResult(r) => UpdateKind::ChosenInlineResult(ChosenInlineResult {
            result_id: r.result_id,
            user_id: user_id(&r.from),
            query: r.query,
            inline_message_id: r.inline_message_id,
        }),
        tg::UpdateKind::CallbackQuery(q) => UpdateKind::CallbackQuery(CallbackQuery {
            user_id: user_id(&q.from),
            username: q.from.username.clone(),
            message: q.message.as_ref().map(|m| MessageRef {
                chat_id: ChatId(m.chat.id.0),
                message_id: MessageId(m.id.0),
            }),
            callback_id: q.id,
            data: q.data,
        }),
        tg::UpdateKind::ShippingQuery(q) => UpdateKind::ShippingQuery(ShippingQuery {
            user_id: user_id(&q.from),
            query_id: q.id,
            invoice_payload: q.invoice_payload,
        }),
        tg::UpdateKind::PreCheckoutQuery(q) => UpdateKind::PreCheckoutQuery(PreCheckoutQuery {
            user_id: user_id(&q.from),
            currency: serde_json::to_value(&q.currency)
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default(),
            total_amount: i64::from(q.total_amount),
            query_id: q.id,
            invoice_payload: q.invoice_payload,
        }),
        _ => return None,
    };
    Some(out)
}

fn chat_message(m: &tg::Message) -> ChatMessage {
    ChatMessage {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
        user_id: m.from().map(user_id),
        username: m.from().and_then(|u| u.username.clone()),
        text: m.text().map(|s| s.to_string()),
    }
}

fn user_id(user: &tg::User) -> UserId {
    UserId(user.id.0 as i64)
}
