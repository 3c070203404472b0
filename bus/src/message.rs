//! Wire data model shared by the Gateway and the Brain.
//!
//! Both [`ChatMessage`] and [`OutboundMessage`] are carried as Redis stream
//! field maps rather than a single JSON blob, mirroring the original
//! `redis_bus.py`/`redis_io.py` `xadd(fields={...})` calls — every field is
//! independently addressable on the stream.

use std::collections::HashMap;

use crate::error::BusError;

/// Discriminator stamped into every `ChatMessage` field map.
pub const CHAT_MESSAGE_TYPE: &str = "chat_message";

/// A single stream entry as read back from the bus: its id plus a flat field map.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    /// The `type` field, if present — callers dispatch on this before
    /// attempting a full [`ChatMessage::from_fields`] parse.
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").map(String::as_str)
    }
}

/// A chat event ingested by the Gateway and appended to the IN stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub ts: i64,
    pub channel: String,
    pub user: String,
    pub text: String,
    pub msg_id: String,
    pub user_id: String,
    pub display_name: String,
    pub badges: String,
    pub is_mod: bool,
    pub subscriber: bool,
    pub vip: bool,
    pub raw: String,
}

impl ChatMessage {
    /// Encode as the field list passed to `XADD`.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("type".to_string(), CHAT_MESSAGE_TYPE.to_string()),
            ("ts".to_string(), self.ts.to_string()),
            ("channel".to_string(), self.channel.clone()),
            ("user".to_string(), self.user.clone()),
            ("text".to_string(), self.text.clone()),
            ("msg_id".to_string(), self.msg_id.clone()),
            ("user_id".to_string(), self.user_id.clone()),
            ("display_name".to_string(), self.display_name.clone()),
            ("badges".to_string(), self.badges.clone()),
            ("mod".to_string(), bool_field(self.is_mod)),
            ("subscriber".to_string(), bool_field(self.subscriber)),
            ("vip".to_string(), bool_field(self.vip)),
            ("raw".to_string(), self.raw.clone()),
        ]
    }

    /// Decode from a field map read back off the bus.
    ///
    /// Callers are expected to check [`StreamEntry::kind`] is
    /// `CHAT_MESSAGE_TYPE` first — the Brain loop skips non-chat records
    /// rather than treating them as malformed.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, BusError> {
        let get = |key: &str| -> Result<String, BusError> {
            fields
                .get(key)
                .cloned()
                .ok_or_else(|| BusError::MalformedRecord(format!("missing field `{key}`")))
        };

        let ts: i64 = get("ts")?
            .parse()
            .map_err(|_| BusError::MalformedRecord("field `ts` is not an integer".to_string()))?;

        Ok(ChatMessage {
            ts,
            channel: get("channel")?,
            user: get("user")?,
            text: get("text")?,
            msg_id: get("msg_id")?,
            user_id: fields.get("user_id").cloned().unwrap_or_default(),
            display_name: fields.get("display_name").cloned().unwrap_or_default(),
            badges: fields.get("badges").cloned().unwrap_or_default(),
            is_mod: parse_bool_field(fields.get("mod")),
            subscriber: parse_bool_field(fields.get("subscriber")),
            vip: parse_bool_field(fields.get("vip")),
            raw: fields.get("raw").cloned().unwrap_or_default(),
        })
    }
}

/// A reply emitted by the Brain and drained by the Gateway's Sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub ts: i64,
    pub channel: String,
    pub text: String,
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("ts".to_string(), self.ts.to_string()),
            ("channel".to_string(), self.channel.clone()),
            ("text".to_string(), self.text.clone()),
        ];
        if let Some(reply_to) = &self.reply_to {
            fields.push(("reply_to".to_string(), reply_to.clone()));
        }
        fields
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, BusError> {
        let get = |key: &str| -> Result<String, BusError> {
            fields
                .get(key)
                .cloned()
                .ok_or_else(|| BusError::MalformedRecord(format!("missing field `{key}`")))
        };

        let ts: i64 = get("ts")?
            .parse()
            .map_err(|_| BusError::MalformedRecord("field `ts` is not an integer".to_string()))?;

        Ok(OutboundMessage {
            ts,
            channel: get("channel")?,
            text: get("text")?,
            reply_to: fields.get("reply_to").cloned(),
        })
    }
}

fn bool_field(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn parse_bool_field(value: Option<&String>) -> bool {
    matches!(value.map(String::as_str), Some("1") | Some("true"))
}
