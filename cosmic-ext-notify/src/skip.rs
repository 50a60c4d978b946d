//! Skip Policy Evaluator
//!
//! Decides whether a message produces an alert and whether that alert plays a
//! sound. Evaluation is a pure function of the message, the conversation
//! metadata, the mute state of the sender and the current settings snapshot.
//!
//! Rules, first match wins:
//!
//! 1. Desktop alerts disabled: `Skip`.
//! 2. Outgoing message that is not a reminder: `Skip`.
//! 3. Conversation unknown to the session: `Skip`.
//! 4. Reminder: announced silently in muted conversations, normally otherwise.
//! 5. Unmuted conversation: `DontSkip`, silent only if the message was sent
//!    silently.
//! 6. Conversation mute state not loaded: `Unknown`.
//! 7. Muted conversation, message mentions the local user and the sender is
//!    not muted: `DontSkip`. Sender mute state not loaded: `Unknown`.
//! 8. Muted conversation with include-muted on: `DontSkip`, silent.
//! 9. Otherwise: `Skip`.

use crate::settings::Settings;
use crate::types::{ConversationInfo, IncomingMessage, MuteState};
use serde::{Deserialize, Serialize};

/// Outcome of skip evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipValue {
    /// Policy inputs not loaded yet; re-evaluate later
    Unknown,
    Skip,
    DontSkip,
}

/// Skip decision plus the silent flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipState {
    pub value: SkipValue,
    /// Shown and counted, but without sound
    pub silent: bool,
}

impl SkipState {
    pub const UNKNOWN: SkipState = SkipState {
        value: SkipValue::Unknown,
        silent: false,
    };

    pub const SKIP: SkipState = SkipState {
        value: SkipValue::Skip,
        silent: false,
    };

    pub fn dont_skip(silent: bool) -> Self {
        Self {
            value: SkipValue::DontSkip,
            silent,
        }
    }

    pub fn is_skip(&self) -> bool {
        self.value == SkipValue::Skip
    }

    pub fn is_unknown(&self) -> bool {
        self.value == SkipValue::Unknown
    }
}

/// Evaluate the skip policy for `message`
///
/// `conversation` is `None` when the session no longer knows the
/// conversation. `sender_mute` is only consulted for mentions in muted
/// conversations.
pub fn evaluate(
    message: &IncomingMessage,
    conversation: Option<&ConversationInfo>,
    sender_mute: MuteState,
    settings: &Settings,
) -> SkipState {
    if !settings.desktop_enabled {
        return SkipState::SKIP;
    }
    if message.outgoing && !message.is_reminder() {
        return SkipState::SKIP;
    }
    let Some(conversation) = conversation else {
        return SkipState::SKIP;
    };

    if message.is_reminder() {
        return match conversation.mute {
            MuteState::Unknown => SkipState::UNKNOWN,
            MuteState::Muted => SkipState::dont_skip(true),
            MuteState::Unmuted => SkipState::dont_skip(message.silent),
        };
    }

    match conversation.mute {
        MuteState::Unmuted => return SkipState::dont_skip(message.silent),
        MuteState::Unknown => return SkipState::UNKNOWN,
        MuteState::Muted => {}
    }

    if message.mentions_me {
        match sender_mute {
            MuteState::Unmuted => return SkipState::dont_skip(message.silent),
            MuteState::Unknown => return SkipState::UNKNOWN,
            MuteState::Muted => {}
        }
    }

    if settings.include_muted {
        SkipState::dont_skip(true)
    } else {
        SkipState::SKIP
    }
}
