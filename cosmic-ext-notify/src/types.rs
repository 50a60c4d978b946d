//! Core identifiers and message records
//!
//! The engine does not own the conversation/message data model. It only sees
//! the snapshot of a message handed to it on arrival and the per-conversation
//! metadata exposed through [`Session`](crate::Session).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical time in milliseconds
///
/// The engine never reads a clock. Every operation that depends on time takes
/// `now` explicitly, which keeps scheduling deterministic under test.
pub type Time = u64;

/// Opaque conversation (chat, group or channel) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub u64);

/// Conversation-scoped message sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(pub i64);

/// Sender / originator identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

/// Globally unique message reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FullMsgId {
    pub conversation: ConversationId,
    pub msg: MsgId,
}

impl FullMsgId {
    pub fn new(conversation: ConversationId, msg: MsgId) -> Self {
        Self { conversation, msg }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conv:{}", self.0)
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

impl fmt::Display for FullMsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conversation, self.msg)
    }
}

/// Snapshot of a message as delivered to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Conversation the message belongs to
    pub conversation: ConversationId,

    /// Sequence number inside the conversation
    pub id: MsgId,

    /// Author of the message
    pub sender: PeerId,

    /// Display name of the author, used for group subtitles
    #[serde(default)]
    pub sender_name: String,

    /// Plain text preview
    #[serde(default)]
    pub text: String,

    /// Origin timestamp in milliseconds (used for forward-run proximity)
    #[serde(default)]
    pub date: Time,

    /// Authored by the local user
    #[serde(default)]
    pub outgoing: bool,

    /// Published from the local user's scheduled queue (a reminder)
    #[serde(default)]
    pub from_scheduled: bool,

    /// Sent as a silent message
    #[serde(default)]
    pub silent: bool,

    /// Forwarded from elsewhere
    #[serde(default)]
    pub forwarded: bool,

    /// Mentions the local user
    #[serde(default)]
    pub mentions_me: bool,
}

impl IncomingMessage {
    /// Minimal incoming text message, mostly useful in tests and demos
    pub fn new(conversation: ConversationId, id: MsgId, sender: PeerId) -> Self {
        Self {
            conversation,
            id,
            sender,
            sender_name: String::new(),
            text: String::new(),
            date: 0,
            outgoing: false,
            from_scheduled: false,
            silent: false,
            forwarded: false,
            mentions_me: false,
        }
    }

    pub fn full_id(&self) -> FullMsgId {
        FullMsgId::new(self.conversation, self.id)
    }

    /// Outgoing message released from the scheduled queue
    pub fn is_reminder(&self) -> bool {
        self.outgoing && self.from_scheduled
    }
}

/// Mute state as known by the data model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuteState {
    /// Not loaded yet
    #[default]
    Unknown,
    Muted,
    Unmuted,
}

/// Kind of conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// One-to-one chat
    #[default]
    Private,
    /// Multi-member group
    Group,
    /// Broadcast channel (members cannot post)
    Channel,
}

/// Per-conversation metadata read from the data model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub title: String,

    #[serde(default)]
    pub kind: ConversationKind,

    #[serde(default)]
    pub mute: MuteState,

    /// Whether the local user may post here
    #[serde(default = "default_true")]
    pub can_write: bool,
}

fn default_true() -> bool {
    true
}

impl ConversationInfo {
    pub fn new(title: impl Into<String>, kind: ConversationKind, mute: MuteState) -> Self {
        Self {
            title: title.into(),
            kind,
            mute,
            can_write: kind != ConversationKind::Channel,
        }
    }

    pub fn is_private(&self) -> bool {
        self.kind == ConversationKind::Private
    }
}

/// Formatting tag over a text range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextTag {
    pub offset: usize,
    pub length: usize,
    pub id: String,
}

/// Reply text as typed into a notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextWithTags {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<TextTag>,
}

impl TextWithTags {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_id_display() {
        let id = FullMsgId::new(ConversationId(7), MsgId(42));
        assert_eq!(id.to_string(), "conv:7/42");
    }

    #[test]
    fn test_reminder_requires_outgoing_and_scheduled() {
        let mut message = IncomingMessage::new(ConversationId(1), MsgId(1), PeerId(1));
        message.from_scheduled = true;
        assert!(!message.is_reminder());

        message.outgoing = true;
        assert!(message.is_reminder());
    }

    #[test]
    fn test_channel_is_not_writable_by_default() {
        let info = ConversationInfo::new("News", ConversationKind::Channel, MuteState::Unmuted);
        assert!(!info.can_write);
        assert!(!info.is_private());
    }

    #[test]
    fn test_message_deserialization_defaults() {
        let json = r#"{"conversation": 3, "id": 10, "sender": 5}"#;
        let message: IncomingMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.full_id(), FullMsgId::new(ConversationId(3), MsgId(10)));
        assert!(!message.forwarded);
        assert!(message.text.is_empty());
    }

    #[test]
    fn test_empty_reply_detection() {
        assert!(TextWithTags::plain("   ").is_empty());
        assert!(!TextWithTags::plain("ok").is_empty());
    }
}
