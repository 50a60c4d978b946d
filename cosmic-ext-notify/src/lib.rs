//! # cosmic-ext-notify
//!
//! Per-conversation notification scheduling and deduplication.
//!
//! Given a stream of incoming messages the engine decides which of them
//! produce an alert, when each alert fires, how bursts in one conversation are
//! folded into a single alert, and how scheduled or displayed alerts are
//! invalidated when messages are read, deleted or cleared.
//!
//! ## Components
//!
//! - [`skip`]: skip policy evaluation (muted, outgoing, mentions, reminders)
//! - [`WaiterRegistry`]: at most one pending waiter per conversation
//! - [`AlertClock`]: the wait timer and the grouping timer
//! - [`Dispatcher`]: rendering, forwarded-run coalescing, backend calls
//! - [`SettingsBus`]: settings change broadcast
//! - [`Engine`]: owns all of the above for one session
//! - [`EngineDriver`]: tokio loop around an engine
//!
//! ## Example
//!
//! ```rust
//! use cosmic_ext_notify::{
//!     ConversationId, ConversationInfo, ConversationKind, Engine, EngineConfig, InAppBackend,
//!     IncomingMessage, MemorySession, MsgId, MuteState, PeerId, Settings,
//! };
//! use std::rc::Rc;
//!
//! let session = Rc::new(MemorySession::new());
//! session.set_conversation(
//!     ConversationId(1),
//!     ConversationInfo::new("Alice", ConversationKind::Private, MuteState::Unmuted),
//! );
//!
//! let settings = Settings::default();
//! let backend = Box::new(InAppBackend::new(&settings));
//! let mut engine = Engine::new(EngineConfig::default(), settings, session, backend).unwrap();
//!
//! let mut message = IncomingMessage::new(ConversationId(1), MsgId(1), PeerId(42));
//! message.text = "lunch?".to_string();
//! engine.schedule(message, 0);
//!
//! assert_eq!(engine.next_deadline(), Some(100));
//! let report = engine.on_timer(100);
//! assert_eq!(report.shown, 1);
//! ```

pub mod alerts;
pub mod backend;
pub mod bus;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod skip;
pub mod sound;
pub mod types;

pub use alerts::{Alert, AlertLedger, AlertPass};
pub use backend::{
    Capabilities, DisplayBackend, DisplayOptions, InAppBackend, Presentation, PresentationKind,
};
pub use bus::{SettingsBus, Subscription};
pub use clock::{AlertClock, Timer};
pub use config::EngineConfig;
pub use dispatcher::{Dispatcher, ForwardAggregation, ShowOutcome, ShowRequest};
pub use engine::{Engine, TimerReport};
pub use error::{NotifyError, Result};
pub use registry::{Upserted, Waiter, WaiterRegistry};
pub use runtime::{EngineDriver, EngineEvent};
pub use session::{MemorySession, RecordedActions, ReplyRequest, Session, SessionActions};
pub use settings::{ChangeType, NotifyView, ScreenCorner, Settings};
pub use skip::{SkipState, SkipValue};
pub use sound::{SoundSlot, SoundTrack};
pub use types::{
    ConversationId, ConversationInfo, ConversationKind, FullMsgId, IncomingMessage, MsgId,
    MuteState, PeerId, TextTag, TextWithTags, Time,
};
