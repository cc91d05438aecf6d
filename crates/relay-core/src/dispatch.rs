use crate::messaging::types::{
    ChatAction, InlineButton, InlineKeyboard, OutboundAction, Update, UpdateKind,
};

/// How replies are shaped.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplyPolicy {
    /// Attached to every text reply. Empty → no keyboard.
    pub keyboard: InlineKeyboard,
    /// Send a typing indicator before the reply.
    pub typing_indicator: bool,
}

impl Default for ReplyPolicy {
    fn default() -> Self {
        Self {
            keyboard: InlineKeyboard::single_row(vec![
                InlineButton {
                    label: "yes".to_string(),
                    callback_data: "yes my boy!".to_string(),
                },
                InlineButton {
                    label: "no".to_string(),
                    callback_data: "no my boy?".to_string(),
                },
            ]),
            typing_indicator: true,
        }
    }
}

/// Outbound actions for one update, in emission order.
///
/// Kinds without a handler yield nothing; the update is still marked as seen.
pub fn derive_actions(update: &Update, policy: &ReplyPolicy) -> Vec<OutboundAction> {
    match &update.kind {
        UpdateKind::Message(msg) => {
            let Some(text) = msg.text.as_deref().filter(|t| !t.is_empty()) else {
                return Vec::new();
            };

            let mut out = Vec::with_capacity(2);
            if policy.typing_indicator {
                out.push(OutboundAction::ChatAction {
                    chat_id: msg.chat_id,
                    action: ChatAction::Typing,
                });
            }
            out.push(OutboundAction::Reply {
                chat_id: msg.chat_id,
                text: text.to_string(),
                keyboard: (!policy.keyboard.is_empty()).then(|| policy.keyboard.clone()),
            });
            out
        }
        UpdateKind::CallbackQuery(q) => vec![OutboundAction::AnswerCallback {
            callback_id: q.callback_id.clone(),
            text: q.data.clone(),
        }],
        UpdateKind::InlineQuery(q) => vec![OutboundAction::AnswerInline {
            query_id: q.query_id.clone(),
            results: Vec::new(),
        }],
        UpdateKind::EditedMessage(_)
        | UpdateKind::ChannelPost(_)
        | UpdateKind::EditedChannelPost(_)
        | UpdateKind::ChosenInlineResult(_)
        | UpdateKind::ShippingQuery(_)
        | UpdateKind::PreCheckoutQuery(_)
        | UpdateKind::Other { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId, UserId};
    use crate::messaging::types::{CallbackQuery, ChatMessage, InlineQuery};

    fn message(chat: i64, text: Option<&str>) -> UpdateKind {
        UpdateKind::Message(ChatMessage {
            chat_id: ChatId(chat),
            message_id: MessageId(1),
            user_id: Some(UserId(9)),
            username: Some("alice".to_string()),
            text: text.map(|s| s.to_string()),
        })
    }

    #[test]
    fn text_message_gets_typing_then_echo_reply() {
        let actions = derive_actions(
            &Update::new(100, message(7, Some("hi"))),
            &ReplyPolicy::default(),
        );

        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            OutboundAction::ChatAction {
                chat_id: ChatId(7),
                action: ChatAction::Typing
            }
        );
        let OutboundAction::Reply {
            chat_id,
            text,
            keyboard,
        } = &actions[1]
        else {
            panic!("expected reply, got {:?}", actions[1]);
        };
        assert_eq!(*chat_id, ChatId(7));
        assert_eq!(text, "hi");
        let kb = keyboard.as_ref().unwrap();
        assert_eq!(kb.rows[0][0].label, "yes");
        assert_eq!(kb.rows[0][1].callback_data, "no my boy?");
    }

    #[test]
    fn empty_keyboard_and_no_typing() {
        let policy = ReplyPolicy {
            keyboard: InlineKeyboard::default(),
            typing_indicator: false,
        };
        let actions = derive_actions(&Update::new(1, message(7, Some("hi"))), &policy);
        assert_eq!(
            actions,
            vec![OutboundAction::Reply {
                chat_id: ChatId(7),
                text: "hi".to_string(),
                keyboard: None,
            }]
        );
    }

    #[test]
    fn message_without_text_emits_nothing() {
        let update = Update::new(1, message(7, None));
        assert!(derive_actions(&update, &ReplyPolicy::default()).is_empty());
    }

    #[test]
    fn callback_is_acknowledged_with_its_data() {
        let update = Update::new(
            2,
            UpdateKind::CallbackQuery(CallbackQuery {
                callback_id: "cb-1".to_string(),
                user_id: UserId(9),
                username: None,
                data: Some("yes my boy!".to_string()),
                message: None,
            }),
        );
        assert_eq!(
            derive_actions(&update, &ReplyPolicy::default()),
            vec![OutboundAction::AnswerCallback {
                callback_id: "cb-1".to_string(),
                text: Some("yes my boy!".to_string()),
            }]
        );
    }

    #[test]
    fn inline_query_gets_empty_answer() {
        let update = Update::new(
            3,
            UpdateKind::InlineQuery(InlineQuery {
                query_id: "iq".to_string(),
                user_id: UserId(9),
                query: "cats".to_string(),
                offset: String::new(),
            }),
        );
        assert_eq!(
            derive_actions(&update, &ReplyPolicy::default()),
            vec![OutboundAction::AnswerInline {
                query_id: "iq".to_string(),
                results: vec![],
            }]
        );
    }

    #[test]
    fn status_kinds_emit_nothing() {
        let edited = Update::new(
            4,
            UpdateKind::EditedMessage(ChatMessage {
                chat_id: ChatId(7),
                message_id: MessageId(1),
                user_id: None,
                username: None,
                text: Some("edit".to_string()),
            }),
        );
        assert!(derive_actions(&edited, &ReplyPolicy::default()).is_empty());

        let other = Update::new(
            5,
            UpdateKind::Other {
                kind: "poll".to_string(),
            },
        );
        assert!(derive_actions(&other, &ReplyPolicy::default()).is_empty());
    }
}
