//! Shared fixtures for engine scenario tests

#![allow(dead_code)]

use cosmic_ext_notify::{
    Capabilities, ConversationId, ConversationInfo, ConversationKind, DisplayBackend, Engine,
    EngineConfig, FullMsgId, IncomingMessage, MemorySession, MsgId, MuteState, NotifyError,
    PeerId, Presentation, Result, SessionActions, Settings, SoundSlot, Time,
};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Backend call as observed by the tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Show(Presentation),
    ClearConversation(ConversationId),
    ClearItem(FullMsgId),
    UpdateAll(usize),
    ClearAll,
    ClearAllFast,
}

#[derive(Debug, Default)]
pub struct BackendLog {
    pub calls: Vec<Call>,
    pub rejected: HashSet<ConversationId>,
}

impl BackendLog {
    pub fn shows(&self) -> Vec<&Presentation> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Show(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn shown_conversations(&self) -> Vec<u64> {
        self.shows().iter().map(|p| p.conversation.0).collect()
    }
}

/// Records every call; optionally rejects shows for some conversations
pub struct RecordingBackend {
    log: Rc<RefCell<BackendLog>>,
    capabilities: Capabilities,
}

impl RecordingBackend {
    pub fn new(capabilities: Capabilities) -> (Self, Rc<RefCell<BackendLog>>) {
        let log = Rc::new(RefCell::new(BackendLog::default()));
        (
            Self {
                log: log.clone(),
                capabilities,
            },
            log,
        )
    }
}

impl DisplayBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn show_notification(&mut self, presentation: &Presentation) -> Result<()> {
        let mut log = self.log.borrow_mut();
        if log.rejected.contains(&presentation.conversation) {
            return Err(NotifyError::BackendRejected(format!(
                "{} refused",
                presentation.conversation
            )));
        }
        log.calls.push(Call::Show(presentation.clone()));
        Ok(())
    }

    fn clear_all_fast(&mut self) {
        self.log.borrow_mut().calls.push(Call::ClearAllFast);
    }

    fn clear_from_conversation(&mut self, conversation: ConversationId) {
        self.log
            .borrow_mut()
            .calls
            .push(Call::ClearConversation(conversation));
    }

    fn update_all(&mut self, shown: &[Presentation]) {
        if self.capabilities.incremental_update {
            self.log.borrow_mut().calls.push(Call::UpdateAll(shown.len()));
        } else {
            self.clear_all_fast();
        }
    }

    fn clear_all(&mut self) {
        if self.capabilities.animated_clear {
            self.log.borrow_mut().calls.push(Call::ClearAll);
        } else {
            self.clear_all_fast();
        }
    }

    fn clear_from_item(&mut self, id: FullMsgId) {
        if self.capabilities.per_item_clear {
            self.log.borrow_mut().calls.push(Call::ClearItem(id));
        }
    }
}

pub struct Harness {
    pub engine: Engine,
    pub session: Rc<MemorySession>,
    pub log: Rc<RefCell<BackendLog>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), Capabilities::FULL)
    }

    pub fn with_config(config: EngineConfig, capabilities: Capabilities) -> Self {
        let session = Rc::new(MemorySession::new());
        for id in 1..=5 {
            session.set_conversation(
                ConversationId(id),
                ConversationInfo::new(
                    format!("Group {}", id),
                    ConversationKind::Group,
                    MuteState::Unmuted,
                ),
            );
        }
        let (backend, log) = RecordingBackend::new(capabilities);
        let engine = Engine::new(config, Settings::default(), session.clone(), Box::new(backend))
            .expect("valid config");
        Self {
            engine,
            session,
            log,
        }
    }

    pub fn with_actions(mut self, actions: Box<dyn SessionActions>) -> Self {
        self.engine = self.engine.with_actions(actions);
        self
    }

    pub fn with_sound(mut self, sound: SoundSlot) -> Self {
        self.engine = self.engine.with_sound(sound);
        self
    }

    /// Fire every deadline up to and including `until`
    pub fn advance(&mut self, until: Time) {
        while let Some(deadline) = self.engine.next_deadline() {
            if deadline > until {
                break;
            }
            self.engine.on_timer(deadline);
        }
    }

    pub fn arrive(&mut self, message: IncomingMessage, at: Time) {
        self.advance(at);
        self.engine.schedule(message, at);
    }

    pub fn shown_conversations(&self) -> Vec<u64> {
        self.log.borrow().shown_conversations()
    }
}

pub fn message(conversation: u64, id: i64, sender: u64) -> IncomingMessage {
    let mut message = IncomingMessage::new(ConversationId(conversation), MsgId(id), PeerId(sender));
    message.text = format!("text {}", id);
    message.sender_name = format!("Peer {}", sender);
    message
}

pub fn forwarded(conversation: u64, id: i64, sender: u64, date: Time) -> IncomingMessage {
    let mut message = message(conversation, id, sender);
    message.forwarded = true;
    message.date = date;
    message
}
