//! Display Dispatcher
//!
//! Turns fired waiters into [`Presentation`]s and drives the display backend.
//! It remembers what it presented, so that rendering-only setting changes can
//! re-render displayed alerts without running eligibility again, and it holds
//! back forwarded runs briefly so that a run split across several waiters
//! ends up as a single "N forwarded messages" alert.

use crate::backend::{
    DisplayBackend, DisplayOptions, Presentation, PresentationKind, DEMO_CONVERSATION,
};
use crate::settings::{NotifyView, Settings};
use crate::types::{
    ConversationId, ConversationInfo, FullMsgId, IncomingMessage, MsgId, PeerId, Time,
};
use crate::Result;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Title used when the conversation name must not be revealed
pub const DEFAULT_APP_NAME: &str = "COSMIC Messages";

const HIDDEN_TEXT: &str = "You have a new message";
const REMINDER_MARKER: &str = "\u{1F4C5} ";

/// Everything needed to render one alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowRequest {
    pub message: IncomingMessage,
    pub conversation: ConversationInfo,
    pub peer: PeerId,
    /// Forwarded messages this alert stands for, 0 for ordinary messages
    pub forwarded_count: u32,
    /// Further messages folded into this alert
    pub absorbed: usize,
    pub silent: bool,
}

impl ShowRequest {
    pub fn id(&self) -> FullMsgId {
        self.message.full_id()
    }
}

/// Settings-derived inputs of rendering
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub settings: &'a Settings,
    pub locked: bool,
}

/// Forwarded run waiting to be presented
#[derive(Debug, Clone)]
pub struct ForwardAggregation {
    pub last_forwarded_count: u32,
    pub last_message: FullMsgId,
    pub peer: PeerId,
    /// Origin date of the newest message in the run
    pub last_date: Time,
    /// When the run is presented if nothing extends it
    pub deadline: Time,
    request: ShowRequest,
}

impl ForwardAggregation {
    fn continues(&self, request: &ShowRequest) -> bool {
        self.last_message.conversation == request.message.conversation
            && self.peer == request.peer
            && request.forwarded_count > self.last_forwarded_count
    }
}

/// Result of a `show` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    /// Handed to the backend
    Presented,
    /// Held in the forwarded run until the contained time
    Deferred(Time),
}

#[derive(Debug, Clone)]
struct Shown {
    request: ShowRequest,
    presentation: Presentation,
}

pub struct Dispatcher {
    backend: Box<dyn DisplayBackend>,
    app_name: String,
    forward_wait: Time,
    forward: Option<ForwardAggregation>,
    /// Presentation order, oldest first
    shown: VecDeque<Shown>,
    demo: Option<Presentation>,
}

impl Dispatcher {
    pub fn new(backend: Box<dyn DisplayBackend>, forward_wait: Time) -> Self {
        Self {
            backend,
            app_name: DEFAULT_APP_NAME.to_string(),
            forward_wait,
            forward: None,
            shown: VecDeque::new(),
            demo: None,
        }
    }

    pub fn set_app_name(&mut self, app_name: impl Into<String>) {
        self.app_name = app_name.into();
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Present `request`, or fold it into the pending forwarded run
    pub fn show(
        &mut self,
        request: ShowRequest,
        now: Time,
        ctx: RenderContext<'_>,
    ) -> Result<ShowOutcome> {
        if request.forwarded_count > 0 {
            if let Some(forward) = self.forward.as_mut() {
                if forward.continues(&request) {
                    forward.last_forwarded_count = request.forwarded_count;
                    forward.last_message = request.id();
                    forward.last_date = request.message.date;
                    forward.deadline = now + self.forward_wait;
                    forward.request = request;
                    debug!(
                        "Forwarded run in {} grew to {}",
                        forward.last_message.conversation, forward.last_forwarded_count
                    );
                    return Ok(ShowOutcome::Deferred(forward.deadline));
                }
            }

            let flushed = self.flush(ctx);
            let deadline = now + self.forward_wait;
            self.forward = Some(ForwardAggregation {
                last_forwarded_count: request.forwarded_count,
                last_message: request.id(),
                peer: request.peer,
                last_date: request.message.date,
                deadline,
                request,
            });
            return flushed.map(|_| ShowOutcome::Deferred(deadline));
        }

        let flushed = self.flush(ctx);
        self.present(request, ctx)?;
        flushed.map(|_| ShowOutcome::Presented)
    }

    /// Count of the pending run if `message` would continue it
    pub fn pending_forward_count(
        &self,
        message: &IncomingMessage,
        peer: PeerId,
        proximity_ms: Time,
    ) -> u32 {
        match &self.forward {
            Some(forward)
                if forward.last_message.conversation == message.conversation
                    && forward.peer == peer
                    && forward.last_date.abs_diff(message.date) < proximity_ms =>
            {
                forward.last_forwarded_count
            }
            _ => 0,
        }
    }

    pub fn pending_forward(&self) -> Option<&ForwardAggregation> {
        self.forward.as_ref()
    }

    pub fn forward_deadline(&self) -> Option<Time> {
        self.forward.as_ref().map(|f| f.deadline)
    }

    /// Present the pending forwarded run; returns whether there was one
    pub fn flush(&mut self, ctx: RenderContext<'_>) -> Result<bool> {
        match self.forward.take() {
            Some(forward) => {
                debug!(
                    "Presenting forwarded run of {} in {}",
                    forward.last_forwarded_count, forward.last_message.conversation
                );
                self.present(forward.request, ctx)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Present the pending forwarded run if its deadline passed
    pub fn flush_due(&mut self, now: Time, ctx: RenderContext<'_>) -> Result<bool> {
        match self.forward_deadline() {
            Some(deadline) if deadline <= now => self.flush(ctx),
            _ => Ok(false),
        }
    }

    fn present(&mut self, request: ShowRequest, ctx: RenderContext<'_>) -> Result<()> {
        let presentation = self.render(&request, ctx);
        self.backend.show_notification(&presentation)?;
        debug!(
            "Presented {} via {} (forwarded={}, absorbed={})",
            presentation.id(),
            self.backend.name(),
            presentation.forwarded_count,
            request.absorbed
        );
        self.shown.push_back(Shown {
            request,
            presentation,
        });
        self.enforce_max_count(ctx.settings.max_count);
        Ok(())
    }

    /// Build the presentation for `request` under the current settings
    pub fn render(&self, request: &ShowRequest, ctx: RenderContext<'_>) -> Presentation {
        let message = &request.message;
        let conversation = &request.conversation;
        let options = DisplayOptions::compute(message, conversation, ctx.settings, ctx.locked);

        let title = if options.hide_name_and_photo {
            self.app_name.clone()
        } else if message.is_reminder() {
            format!("{}{}", REMINDER_MARKER, conversation.title)
        } else {
            conversation.title.clone()
        };

        let subtitle = if options.hide_name_and_photo || conversation.is_private() {
            String::new()
        } else {
            message.sender_name.clone()
        };

        let body = if options.hide_message_text {
            HIDDEN_TEXT.to_string()
        } else if request.forwarded_count > 1 {
            format!("{} forwarded messages", request.forwarded_count)
        } else {
            let mut text = if message.text.is_empty() && message.forwarded {
                "Forwarded message".to_string()
            } else {
                message.text.clone()
            };
            if ctx.settings.count_messages && request.absorbed > 0 {
                text = format!("{} (+{} more)", text, request.absorbed);
            }
            text
        };

        Presentation {
            kind: PresentationKind::Message,
            conversation: message.conversation,
            msg: message.id,
            peer: request.peer,
            title,
            subtitle,
            body,
            forwarded_count: request.forwarded_count,
            options,
            silent: request.silent,
        }
    }

    pub fn clear_conversation(&mut self, conversation: ConversationId) {
        if self
            .forward
            .as_ref()
            .is_some_and(|f| f.last_message.conversation == conversation)
        {
            self.forward = None;
        }
        self.shown.retain(|s| s.presentation.conversation != conversation);
        self.backend.clear_from_conversation(conversation);
    }

    pub fn clear_message(&mut self, id: FullMsgId) {
        if self.forward.as_ref().is_some_and(|f| f.last_message == id) {
            self.forward = None;
        }
        let before = self.shown.len();
        self.shown.retain(|s| s.presentation.id() != id);
        if self.shown.len() != before {
            self.backend.clear_from_item(id);
        }
    }

    /// Clear every displayed alert of `conversation` up to and including `up_to`
    pub fn clear_read(&mut self, conversation: ConversationId, up_to: MsgId) {
        if self
            .forward
            .as_ref()
            .is_some_and(|f| {
                f.last_message.conversation == conversation && f.last_message.msg <= up_to
            })
        {
            self.forward = None;
        }

        let mut read = Vec::new();
        self.shown.retain(|s| {
            let id = s.presentation.id();
            let is_read = id.conversation == conversation && id.msg <= up_to;
            if is_read {
                read.push(id);
            }
            !is_read
        });
        for id in read {
            self.backend.clear_from_item(id);
        }
    }

    pub fn clear_all(&mut self, fast: bool) {
        self.forward = None;
        self.shown.clear();
        self.demo = None;
        if fast {
            self.backend.clear_all_fast();
        } else {
            self.backend.clear_all();
        }
    }

    /// Re-render displayed alerts after a rendering-only settings change
    pub fn update_all(&mut self, ctx: RenderContext<'_>) {
        let rendered: Vec<Presentation> = self
            .shown
            .iter()
            .map(|s| self.render(&s.request, ctx))
            .collect();
        for (shown, presentation) in self.shown.iter_mut().zip(&rendered) {
            shown.presentation = presentation.clone();
        }

        let mut all = rendered;
        if self.demo.is_some() {
            let demo = self.render_demo(ctx);
            all.push(demo.clone());
            self.demo = Some(demo);
        }
        self.backend.update_all(&all);

        // Backends without incremental update tore everything down.
        if !self.backend.capabilities().incremental_update {
            self.shown.clear();
            self.demo = None;
        }
    }

    /// Placement or limit changed
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.backend.apply_settings(settings);
        self.enforce_max_count(settings.max_count);
    }

    fn enforce_max_count(&mut self, max_count: usize) {
        while self.shown.len() > max_count {
            let Some(oldest) = self.shown.pop_front() else {
                break;
            };
            debug!("Dismissing {} over the display limit", oldest.presentation.id());
            self.backend.clear_from_item(oldest.presentation.id());
        }
    }

    fn render_demo(&self, ctx: RenderContext<'_>) -> Presentation {
        let view = ctx.settings.view;
        let options = DisplayOptions {
            hide_name_and_photo: view > NotifyView::ShowName,
            hide_message_text: view > NotifyView::ShowPreview,
            hide_reply_button: true,
        };
        Presentation {
            kind: PresentationKind::Demo,
            conversation: DEMO_CONVERSATION,
            msg: MsgId(0),
            peer: PeerId(0),
            title: if options.hide_name_and_photo {
                self.app_name.clone()
            } else {
                "Notification preview".to_string()
            },
            subtitle: String::new(),
            body: if options.hide_message_text {
                HIDDEN_TEXT.to_string()
            } else {
                "This is how new messages will appear".to_string()
            },
            forwarded_count: 0,
            options,
            silent: true,
        }
    }

    pub fn show_demo(&mut self, ctx: RenderContext<'_>) -> Result<()> {
        let demo = self.render_demo(ctx);
        self.backend.show_notification(&demo)?;
        self.demo = Some(demo);
        Ok(())
    }

    pub fn hide_demo(&mut self) {
        if self.demo.take().is_some() {
            self.backend.clear_from_conversation(DEMO_CONVERSATION);
        }
    }

    pub fn demo(&self) -> Option<&Presentation> {
        self.demo.as_ref()
    }

    /// Displayed alerts, oldest first
    pub fn shown(&self) -> impl Iterator<Item = &Presentation> {
        self.shown.iter().map(|s| &s.presentation)
    }

    pub fn shown_len(&self) -> usize {
        self.shown.len()
    }

    /// Fast teardown that reports nothing on failure
    pub fn shutdown(&mut self) {
        if self.forward.take().is_some() {
            warn!("Dropping pending forwarded run on shutdown");
        }
        self.clear_all(true);
    }
}
