//! Error handling for the notification engine
//!
//! Engine operations are total over absent entries: clearing a conversation
//! that has nothing pending, or deleting a message that was never scheduled,
//! is a no-op and not an error. Errors only describe things that actually went
//! wrong, such as a display backend refusing a notification.
//!
//! ## Logging Errors
//!
//! Backend failures are never retried by the engine. They are reported to the
//! caller and logged:
//!
//! ```rust,ignore
//! use tracing::warn;
//!
//! if let Err(e) = backend.show_notification(&presentation) {
//!     warn!("Failed to show notification for {}: {}", presentation.id, e);
//! }
//! ```

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors that can occur inside the notification engine
///
/// # Examples
///
/// ```rust
/// use cosmic_ext_notify::NotifyError;
///
/// let error = NotifyError::BackendRejected("quota exceeded".to_string());
/// assert_eq!(error.to_string(), "Backend rejected notification: quota exceeded");
/// assert!(error.is_backend_failure());
/// ```
#[derive(Error, Debug)]
pub enum NotifyError {
    /// I/O error (sound command, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (event decoding)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The platform notification API refused to show an alert
    #[error("Backend rejected notification: {0}")]
    BackendRejected(String),

    /// The display backend cannot be reached at all
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Sound track construction or playback failed
    #[error("Sound error: {0}")]
    Sound(String),

    /// Invalid timing or settings values
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Routing an activation or reply to the session failed
    #[error("Action error: {0}")]
    Action(String),

    /// Internal bookkeeping broke an invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl NotifyError {
    /// Failure reported by a display backend
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            NotifyError::BackendRejected(_) | NotifyError::BackendUnavailable(_)
        )
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            NotifyError::Io(e) => format!("I/O error: {}.", e),
            NotifyError::Json(e) => format!("Data format error: {}.", e),
            NotifyError::BackendRejected(msg) => {
                format!("The desktop refused to show a notification: {}.", msg)
            }
            NotifyError::BackendUnavailable(msg) => {
                format!(
                    "Notification service unavailable: {}. Check that a notification daemon is running.",
                    msg
                )
            }
            NotifyError::Sound(msg) => format!("Notification sound failed: {}.", msg),
            NotifyError::Configuration(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            NotifyError::Action(msg) => format!("Could not handle notification action: {}.", msg),
            NotifyError::InvariantViolation(msg) => format!("Internal error: {}.", msg),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        NotifyError::Configuration(msg.into())
    }
}
