//! Timer driver
//!
//! [`EngineDriver`] runs an [`Engine`] on the current tokio task: it maps
//! wall-clock instants onto the engine's logical milliseconds, feeds incoming
//! [`EngineEvent`]s into it and sleeps until the engine's next deadline.
//!
//! The engine is single-threaded (`!Send`), so the driver must run on a
//! current-thread runtime or inside a `LocalSet`.

use crate::engine::{Engine, TimerReport};
use crate::session::MemorySession;
use crate::settings::{ChangeType, Settings};
use crate::types::{
    ConversationId, ConversationInfo, IncomingMessage, MsgId, MuteState, PeerId, TextWithTags,
    Time,
};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Input to the engine, as produced by the client or a display backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    MessageArrived {
        message: IncomingMessage,
    },
    MessageDeleted {
        conversation: ConversationId,
        msg: MsgId,
    },
    ConversationCleared {
        conversation: ConversationId,
    },
    ReadUpTo {
        conversation: ConversationId,
        up_to: MsgId,
    },
    ClearAll {
        #[serde(default)]
        fast: bool,
    },
    /// A conversation became known or its metadata (mute state) changed
    ConversationUpdated {
        conversation: ConversationId,
        info: ConversationInfo,
    },
    PeerMuteChanged {
        peer: PeerId,
        mute: MuteState,
    },
    LockChanged {
        locked: bool,
    },
    SettingsChanged {
        kind: ChangeType,
        settings: Settings,
    },
    CheckDelayed,
    NotificationActivated {
        conversation: ConversationId,
        msg: MsgId,
    },
    NotificationReplied {
        conversation: ConversationId,
        msg: MsgId,
        reply: TextWithTags,
    },
    Shutdown,
}

/// Drives an [`Engine`] from a channel of events and its own deadlines
pub struct EngineDriver {
    engine: Engine,
    session: Rc<MemorySession>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    origin: Instant,
}

impl EngineDriver {
    /// `session` must be the session the engine was built with
    pub fn new(
        engine: Engine,
        session: Rc<MemorySession>,
        events: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Self {
        Self {
            engine,
            session,
            events,
            origin: Instant::now(),
        }
    }

    /// Logical time of the engine right now
    pub fn now(&self) -> Time {
        self.origin.elapsed().as_millis() as Time
    }

    fn instant_at(&self, time: Time) -> Instant {
        self.origin + Duration::from_millis(time)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Apply one event; returns false once the driver should stop
    pub fn handle(&mut self, event: EngineEvent, now: Time) -> bool {
        match event {
            EngineEvent::MessageArrived { message } => {
                self.engine.schedule(message, now);
            }
            EngineEvent::MessageDeleted { conversation, msg } => {
                self.engine.clear_from_item(conversation, msg);
            }
            EngineEvent::ConversationCleared { conversation } => {
                self.engine.clear_from_conversation(conversation);
            }
            EngineEvent::ReadUpTo {
                conversation,
                up_to,
            } => {
                self.engine.mark_read(conversation, up_to, now);
            }
            EngineEvent::ClearAll { fast } => {
                if fast {
                    self.engine.clear_all_fast();
                } else {
                    self.engine.clear_all();
                }
            }
            EngineEvent::ConversationUpdated { conversation, info } => {
                self.session.set_conversation(conversation, info);
                self.engine.conversation_settings_changed(conversation, now);
            }
            EngineEvent::PeerMuteChanged { peer, mute } => {
                self.session.set_peer_mute(peer, mute);
                self.engine.peer_settings_changed(peer, now);
            }
            EngineEvent::LockChanged { locked } => {
                self.session.set_locked(locked);
                self.engine.update_all();
            }
            EngineEvent::SettingsChanged { kind, settings } => {
                self.engine.change_settings(kind, |current| *current = settings);
            }
            EngineEvent::CheckDelayed => self.engine.check_delayed(now),
            EngineEvent::NotificationActivated { conversation, msg } => {
                if let Err(e) = self.engine.notification_activated(conversation, msg) {
                    warn!("Failed to open {}: {}", conversation, e);
                }
            }
            EngineEvent::NotificationReplied {
                conversation,
                msg,
                reply,
            } => {
                if let Err(e) = self.engine.notification_replied(conversation, msg, reply) {
                    warn!("Failed to send reply to {}: {}", conversation, e);
                }
            }
            EngineEvent::Shutdown => return false,
        }
        true
    }

    fn log_report(report: &TimerReport, now: Time) {
        for e in &report.errors {
            debug!("Backend failure at {}: {}", now, e.user_message());
        }
    }

    /// Run until a shutdown event arrives or every sender is gone
    ///
    /// Returns the engine after it has been shut down.
    pub async fn run(mut self) -> Engine {
        info!("Notification driver running");
        loop {
            let deadline = self.engine.next_deadline().map(|t| self.instant_at(t));

            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        debug!("Event channel closed");
                        break;
                    };
                    let now = self.now();
                    if !self.handle(event, now) {
                        break;
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    let now = self.now();
                    let report = self.engine.on_timer(now);
                    Self::log_report(&report, now);
                }
            }
        }

        self.engine.shutdown();
        self.engine
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
