// src/update.rs

//! Internal representation of one inbound platform update.
//!
//! Only the identifying bits the pipeline needs are decoded; the raw payload
//! is kept next to them so business handlers can read whatever else they need.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Kinds of updates the platform can deliver, by their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateKindTag {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
}

impl UpdateKindTag {
    pub const ALL: [UpdateKindTag; 14] = [
        Self::Message,
        Self::EditedMessage,
        Self::ChannelPost,
        Self::EditedChannelPost,
        Self::InlineQuery,
        Self::ChosenInlineResult,
        Self::CallbackQuery,
        Self::ShippingQuery,
        Self::PreCheckoutQuery,
        Self::Poll,
        Self::PollAnswer,
        Self::MyChatMember,
        Self::ChatMember,
        Self::ChatJoinRequest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::InlineQuery => "inline_query",
            Self::ChosenInlineResult => "chosen_inline_result",
            Self::CallbackQuery => "callback_query",
            Self::ShippingQuery => "shipping_query",
            Self::PreCheckoutQuery => "pre_checkout_query",
            Self::Poll => "poll",
            Self::PollAnswer => "poll_answer",
            Self::MyChatMember => "my_chat_member",
            Self::ChatMember => "chat_member",
            Self::ChatJoinRequest => "chat_join_request",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == name)
    }
}

impl fmt::Display for UpdateKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

impl Message {
    /// Bot command in the text (`/start@mybot args` → `start`).
    pub fn command(&self) -> Option<&str> {
        let text = self.text.as_deref()?.strip_prefix('/')?;
        let word = text.split_whitespace().next()?;
        Some(word.split('@').next().unwrap_or(word))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Tagged union over the concrete update variants.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    CallbackQuery(CallbackQuery),
    /// Anything else; the pipeline only needs its kind.
    Other(UpdateKindTag),
}

impl UpdateKind {
    pub fn tag(&self) -> UpdateKindTag {
        match self {
            UpdateKind::Message(_) => UpdateKindTag::Message,
            UpdateKind::EditedMessage(_) => UpdateKindTag::EditedMessage,
            UpdateKind::CallbackQuery(_) => UpdateKindTag::CallbackQuery,
            UpdateKind::Other(tag) => *tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub update_id: i64,
    pub kind: UpdateKind,
    pub raw: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateParseError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid `{path}`: {source}")]
    Field {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("payload has no `update_id`")]
    MissingId,
    #[error("payload carries no known update kind")]
    UnknownKind,
}

#[derive(Deserialize)]
struct Envelope {
    update_id: i64,
}

impl Update {
    pub fn from_slice(body: &[u8]) -> Result<Self, UpdateParseError> {
        let raw: Value = serde_json::from_slice(body)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self, UpdateParseError> {
        if raw.get("update_id").is_none() {
            return Err(UpdateParseError::MissingId);
        }
        let Envelope { update_id } = decode(&raw)?;

        let obj = raw.as_object().ok_or(UpdateParseError::UnknownKind)?;
        let (tag, payload) = obj
            .iter()
            .find_map(|(key, value)| UpdateKindTag::from_wire(key).map(|tag| (tag, value)))
            .ok_or(UpdateParseError::UnknownKind)?;

        let kind = match tag {
            UpdateKindTag::Message => UpdateKind::Message(decode_at(payload, "message")?),
            UpdateKindTag::EditedMessage => {
                UpdateKind::EditedMessage(decode_at(payload, "edited_message")?)
            }
            UpdateKindTag::CallbackQuery => {
                UpdateKind::CallbackQuery(decode_at(payload, "callback_query")?)
            }
            other => UpdateKind::Other(other),
        };

        Ok(Update { update_id, kind, raw })
    }

    pub fn tag(&self) -> UpdateKindTag {
        self.kind.tag()
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, UpdateParseError> {
    serde_path_to_error::deserialize(value).map_err(|err| UpdateParseError::Field {
        path: err.path().to_string(),
        source: err.into_inner(),
    })
}

fn decode_at<T: for<'de> Deserialize<'de>>(value: &Value, key: &str) -> Result<T, UpdateParseError> {
    decode(value).map_err(|err| match err {
        UpdateParseError::Field { path, source } => UpdateParseError::Field {
            path: format!("{key}.{path}"),
            source,
        },
        other => other,
    })
}
