//! Notification sound resource
//!
//! The track is built lazily on the first audible alert. Construction is
//! attempted at most once: a failed attempt leaves the slot permanently
//! silent instead of retrying on every alert.

use crate::Result;
use tracing::{debug, warn};

pub trait SoundTrack {
    fn play(&mut self) -> Result<()>;
}

/// Builds the track on first use
pub type SoundFactory = Box<dyn FnOnce() -> Result<Box<dyn SoundTrack>>>;

enum SlotState {
    Pending(SoundFactory),
    Ready(Box<dyn SoundTrack>),
    Failed,
    Disabled,
}

/// Lazily constructed sound track
pub struct SoundSlot {
    state: SlotState,
}

impl SoundSlot {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn SoundTrack>> + 'static,
    {
        Self {
            state: SlotState::Pending(Box::new(factory)),
        }
    }

    /// A slot that never plays anything
    pub fn disabled() -> Self {
        Self {
            state: SlotState::Disabled,
        }
    }

    /// Build the track if it was never attempted
    pub fn ensure(&mut self) -> Option<&mut (dyn SoundTrack + 'static)> {
        if matches!(self.state, SlotState::Pending(_)) {
            let SlotState::Pending(factory) = std::mem::replace(&mut self.state, SlotState::Failed)
            else {
                return None;
            };
            match factory() {
                Ok(track) => {
                    debug!("Notification sound track created");
                    self.state = SlotState::Ready(track);
                }
                Err(e) => warn!("Failed to create notification sound: {}", e),
            }
        }

        match &mut self.state {
            SlotState::Ready(track) => Some(track.as_mut()),
            _ => None,
        }
    }

    /// Play the track; returns whether anything played
    pub fn play(&mut self) -> bool {
        let Some(track) = self.ensure() else {
            return false;
        };
        match track.play() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to play notification sound: {}", e);
                false
            }
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self.state, SlotState::Ready(_))
    }
}

impl Default for SoundSlot {
    fn default() -> Self {
        Self::disabled()
    }
}
