//! Display backend contract
//!
//! A backend renders presentations produced by the
//! [`Dispatcher`](crate::Dispatcher). Only showing, per-conversation clearing
//! and fast teardown are mandatory. The remaining operations have defaults
//! that map them onto [`DisplayBackend::clear_all_fast`], so a backend with no
//! incremental capability (a "native" backend that can only show and tear
//! down) still satisfies the whole contract:
//!
//! | Operation | Default |
//! |---|---|
//! | `update_all` | `clear_all_fast` |
//! | `clear_all` | `clear_all_fast` |
//! | `clear_from_item` | no-op |
//! | `apply_settings` | no-op |
//!
//! The engine never assumes more than [`Capabilities::MINIMAL`].

pub mod in_app;

use crate::settings::{NotifyView, Settings};
use crate::types::{
    ConversationId, ConversationInfo, ConversationKind, FullMsgId, IncomingMessage, MsgId, PeerId,
};
use crate::Result;
use serde::{Deserialize, Serialize};

pub use in_app::{Bubble, BubbleState, InAppBackend};

/// Conversation identifier used by the sample alert
pub const DEMO_CONVERSATION: ConversationId = ConversationId(u64::MAX);

/// What a backend can do beyond the mandatory operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `update_all` re-renders in place instead of tearing down
    pub incremental_update: bool,
    /// `clear_from_item` removes a single alert
    pub per_item_clear: bool,
    /// Non-fast clearing animates the dismissal
    pub animated_clear: bool,
}

impl Capabilities {
    pub const MINIMAL: Capabilities = Capabilities {
        incremental_update: false,
        per_item_clear: false,
        animated_clear: false,
    };

    pub const FULL: Capabilities = Capabilities {
        incremental_update: true,
        per_item_clear: true,
        animated_clear: true,
    };
}

/// Privacy flags, computed once per presentation and never recomputed by backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub hide_name_and_photo: bool,
    pub hide_message_text: bool,
    pub hide_reply_button: bool,
}

impl DisplayOptions {
    pub fn compute(
        message: &IncomingMessage,
        conversation: &ConversationInfo,
        settings: &Settings,
        locked: bool,
    ) -> Self {
        let hide_name_and_photo = locked || settings.view > NotifyView::ShowName;
        let hide_message_text = locked || settings.view > NotifyView::ShowPreview;
        let hide_reply_button = hide_message_text
            || message.is_reminder()
            || !conversation.can_write
            || conversation.kind == ConversationKind::Channel;

        Self {
            hide_name_and_photo,
            hide_message_text,
            hide_reply_button,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationKind {
    Message,
    /// Sample alert previewing the current settings
    Demo,
}

/// A fully rendered alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub kind: PresentationKind,
    pub conversation: ConversationId,
    pub msg: MsgId,
    pub peer: PeerId,
    pub title: String,
    pub subtitle: String,
    pub body: String,
    /// Size of the forwarded run this alert stands for (0 when not forwarded)
    pub forwarded_count: u32,
    pub options: DisplayOptions,
    /// No sound requested for this alert
    pub silent: bool,
}

impl Presentation {
    pub fn id(&self) -> FullMsgId {
        FullMsgId::new(self.conversation, self.msg)
    }

    pub fn is_demo(&self) -> bool {
        self.kind == PresentationKind::Demo
    }
}

/// Platform or in-app alert renderer
pub trait DisplayBackend {
    /// Short name for logs
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::MINIMAL
    }

    /// Render one alert
    fn show_notification(&mut self, presentation: &Presentation) -> Result<()>;

    /// Drop every alert immediately, without animation or acknowledgement
    fn clear_all_fast(&mut self);

    fn clear_from_conversation(&mut self, conversation: ConversationId);

    /// Re-render the given alerts, which are everything currently displayed
    fn update_all(&mut self, shown: &[Presentation]) {
        let _ = shown;
        self.clear_all_fast();
    }

    /// Dismiss every alert individually
    fn clear_all(&mut self) {
        self.clear_all_fast();
    }

    fn clear_from_item(&mut self, id: FullMsgId) {
        let _ = id;
    }

    /// Placement or limits changed
    fn apply_settings(&mut self, settings: &Settings) {
        let _ = settings;
    }
}
