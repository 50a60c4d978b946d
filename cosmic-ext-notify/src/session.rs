//! Session collaborators
//!
//! The engine reads conversation metadata through [`Session`] and routes
//! activations and replies out through [`SessionActions`]. Both belong to the
//! surrounding client; [`MemorySession`] and [`RecordedActions`] are simple
//! in-memory versions used by the daemon and by tests.

use crate::types::{ConversationId, ConversationInfo, MsgId, MuteState, PeerId, TextWithTags};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::info;

/// Read-only view of the client's data model
pub trait Session {
    /// Metadata of a conversation, `None` once it is gone
    fn conversation(&self, conversation: ConversationId) -> Option<ConversationInfo>;

    /// Mute state of an individual sender
    fn peer_mute(&self, peer: PeerId) -> MuteState;

    /// The client is passcode-locked
    fn is_locked(&self) -> bool;
}

impl<T: Session + ?Sized> Session for Rc<T> {
    fn conversation(&self, conversation: ConversationId) -> Option<ConversationInfo> {
        (**self).conversation(conversation)
    }

    fn peer_mute(&self, peer: PeerId) -> MuteState {
        (**self).peer_mute(peer)
    }

    fn is_locked(&self) -> bool {
        (**self).is_locked()
    }
}

/// Reply typed into an alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRequest {
    pub conversation: ConversationId,
    pub text: TextWithTags,
    /// Quoted message, only set outside one-to-one chats
    pub reply_to: Option<MsgId>,
}

/// Actions the engine asks the client to perform
pub trait SessionActions {
    fn open_conversation(&mut self, conversation: ConversationId, msg: MsgId) -> Result<()>;

    fn send_reply(&mut self, reply: ReplyRequest) -> Result<()>;
}

impl<T: SessionActions + ?Sized> SessionActions for Rc<RefCell<T>> {
    fn open_conversation(&mut self, conversation: ConversationId, msg: MsgId) -> Result<()> {
        self.borrow_mut().open_conversation(conversation, msg)
    }

    fn send_reply(&mut self, reply: ReplyRequest) -> Result<()> {
        self.borrow_mut().send_reply(reply)
    }
}

/// In-memory data model
#[derive(Debug, Default)]
pub struct MemorySession {
    conversations: RefCell<HashMap<ConversationId, ConversationInfo>>,
    peers: RefCell<HashMap<PeerId, MuteState>>,
    locked: Cell<bool>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a conversation
    pub fn set_conversation(&self, conversation: ConversationId, info: ConversationInfo) {
        self.conversations.borrow_mut().insert(conversation, info);
    }

    pub fn remove_conversation(&self, conversation: ConversationId) {
        self.conversations.borrow_mut().remove(&conversation);
    }

    /// Change the mute state of a known conversation; returns false if unknown
    pub fn set_mute(&self, conversation: ConversationId, mute: MuteState) -> bool {
        match self.conversations.borrow_mut().get_mut(&conversation) {
            Some(info) => {
                info.mute = mute;
                true
            }
            None => false,
        }
    }

    pub fn set_peer_mute(&self, peer: PeerId, mute: MuteState) {
        self.peers.borrow_mut().insert(peer, mute);
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.set(locked);
    }
}

impl Session for MemorySession {
    fn conversation(&self, conversation: ConversationId) -> Option<ConversationInfo> {
        self.conversations.borrow().get(&conversation).cloned()
    }

    fn peer_mute(&self, peer: PeerId) -> MuteState {
        self.peers.borrow().get(&peer).copied().unwrap_or_default()
    }

    fn is_locked(&self) -> bool {
        self.locked.get()
    }
}

/// Records requested actions instead of performing them
#[derive(Debug, Default)]
pub struct RecordedActions {
    pub opened: Vec<(ConversationId, MsgId)>,
    pub replies: Vec<ReplyRequest>,
}

impl SessionActions for RecordedActions {
    fn open_conversation(&mut self, conversation: ConversationId, msg: MsgId) -> Result<()> {
        info!("Open {} at message {}", conversation, msg);
        self.opened.push((conversation, msg));
        Ok(())
    }

    fn send_reply(&mut self, reply: ReplyRequest) -> Result<()> {
        info!(
            "Reply to {} ({} chars)",
            reply.conversation,
            reply.text.text.chars().count()
        );
        self.replies.push(reply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConversationKind;

    #[test]
    fn test_memory_session() {
        let session = MemorySession::new();
        assert!(session.conversation(ConversationId(1)).is_none());
        assert_eq!(session.peer_mute(PeerId(1)), MuteState::Unknown);

        session.set_conversation(
            ConversationId(1),
            ConversationInfo::new("Alice", ConversationKind::Private, MuteState::Unmuted),
        );
        assert!(session.set_mute(ConversationId(1), MuteState::Muted));
        assert!(!session.set_mute(ConversationId(2), MuteState::Muted));
        assert_eq!(
            session.conversation(ConversationId(1)).unwrap().mute,
            MuteState::Muted
        );

        session.set_locked(true);
        let shared: Rc<MemorySession> = Rc::new(session);
        assert!(shared.is_locked());
    }

    #[test]
    fn test_recorded_actions_through_shared_handle() {
        let actions = Rc::new(RefCell::new(RecordedActions::default()));
        let mut handle = actions.clone();

        handle
            .open_conversation(ConversationId(3), MsgId(9))
            .unwrap();
        handle
            .send_reply(ReplyRequest {
                conversation: ConversationId(3),
                text: TextWithTags::plain("on my way"),
                reply_to: None,
            })
            .unwrap();

        assert_eq!(actions.borrow().opened, vec![(ConversationId(3), MsgId(9))]);
        assert_eq!(actions.borrow().replies.len(), 1);
    }
}
