//! In-app alert bubbles
//!
//! Keeps the stack of bubbles drawn by the application itself, anchored at
//! the configured screen corner. Non-fast dismissal leaves a bubble in the
//! `Hiding` state until the renderer finishes its animation and calls
//! [`InAppBackend::finish_animations`].

use super::{Capabilities, DisplayBackend, Presentation};
use crate::settings::{ScreenCorner, Settings};
use crate::types::{ConversationId, FullMsgId};
use crate::Result;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleState {
    Shown,
    /// Dismissal animation running
    Hiding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub presentation: Presentation,
    pub state: BubbleState,
}

impl Bubble {
    pub fn is_shown(&self) -> bool {
        self.state == BubbleState::Shown
    }
}

/// Full-capability backend drawing alerts inside the application window
#[derive(Debug)]
pub struct InAppBackend {
    corner: ScreenCorner,
    max_count: usize,
    /// Oldest first
    bubbles: Vec<Bubble>,
}

impl InAppBackend {
    pub fn new(settings: &Settings) -> Self {
        Self {
            corner: settings.corner,
            max_count: settings.max_count,
            bubbles: Vec::new(),
        }
    }

    pub fn corner(&self) -> ScreenCorner {
        self.corner
    }

    /// Bubbles still on screen, including those being dismissed
    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    /// Shown bubbles from the anchor corner outwards (newest nearest the corner)
    pub fn stack(&self) -> Vec<&Presentation> {
        self.bubbles
            .iter()
            .rev()
            .filter(|b| b.is_shown())
            .map(|b| &b.presentation)
            .collect()
    }

    /// New bubbles push the stack downwards from a top corner
    pub fn grows_downward(&self) -> bool {
        self.corner.is_top()
    }

    pub fn shown_count(&self) -> usize {
        self.bubbles.iter().filter(|b| b.is_shown()).count()
    }

    /// Drop bubbles whose dismissal animation completed
    pub fn finish_animations(&mut self) {
        self.bubbles.retain(Bubble::is_shown);
    }

    fn hide_where(&mut self, mut predicate: impl FnMut(&Presentation) -> bool) {
        for bubble in self.bubbles.iter_mut().filter(|b| b.is_shown()) {
            if predicate(&bubble.presentation) {
                bubble.state = BubbleState::Hiding;
            }
        }
    }

    fn enforce_max_count(&mut self) {
        let mut excess = self.shown_count().saturating_sub(self.max_count);
        for bubble in self.bubbles.iter_mut() {
            if excess == 0 {
                break;
            }
            if bubble.is_shown() {
                debug!("Hiding bubble {} over the limit", bubble.presentation.id());
                bubble.state = BubbleState::Hiding;
                excess -= 1;
            }
        }
    }
}

impl DisplayBackend for InAppBackend {
    fn name(&self) -> &str {
        "in-app"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn show_notification(&mut self, presentation: &Presentation) -> Result<()> {
        if presentation.is_demo() {
            self.hide_where(Presentation::is_demo);
        }
        self.bubbles.push(Bubble {
            presentation: presentation.clone(),
            state: BubbleState::Shown,
        });
        self.enforce_max_count();
        Ok(())
    }

    fn clear_all_fast(&mut self) {
        self.bubbles.clear();
    }

    fn clear_from_conversation(&mut self, conversation: ConversationId) {
        self.hide_where(|p| p.conversation == conversation);
    }

    fn update_all(&mut self, shown: &[Presentation]) {
        for bubble in self.bubbles.iter_mut().filter(|b| b.is_shown()) {
            let id = bubble.presentation.id();
            if let Some(fresh) = shown.iter().find(|p| p.id() == id) {
                bubble.presentation = fresh.clone();
            }
        }
    }

    fn clear_all(&mut self) {
        self.hide_where(|_| true);
    }

    fn clear_from_item(&mut self, id: FullMsgId) {
        self.hide_where(|p| p.id() == id);
    }

    fn apply_settings(&mut self, settings: &Settings) {
        self.corner = settings.corner;
        self.max_count = settings.max_count;
        self.enforce_max_count();
    }
}
