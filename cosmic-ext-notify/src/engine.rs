//! Notification engine
//!
//! One [`Engine`] per active session owns the waiter registry, the alert
//! ledger, the alert clock and the display dispatcher. Every entry point is
//! synchronous and takes the current logical time explicitly; the engine
//! never sleeps. A driver (see [`EngineDriver`](crate::EngineDriver)) waits
//! until [`Engine::next_deadline`] and calls [`Engine::on_timer`].
//!
//! ## Flow
//!
//! ```text
//! schedule ─▶ skip policy ─┬─ Skip ──────▶ dropped
//!                          ├─ Unknown ───▶ parked until check_delayed
//!                          └─ DontSkip ──▶ registry + alert ledger ─▶ clock
//!
//! on_timer ─▶ grouping timer: show_grouped (every due waiter, forwarded runs)
//!          ─▶ wait timer:     show_next    (one waiter at a time)
//! ```
//!
//! Operations on conversations or messages the engine does not know about are
//! no-ops. Backend failures are collected in the [`TimerReport`] and the
//! engine moves on to the next waiter.

use crate::alerts::{Alert, AlertLedger};
use crate::backend::DisplayBackend;
use crate::bus::{SettingsBus, Subscription};
use crate::clock::AlertClock;
use crate::config::EngineConfig;
use crate::dispatcher::{Dispatcher, RenderContext, ShowOutcome, ShowRequest};
use crate::registry::{Waiter, WaiterRegistry};
use crate::session::{ReplyRequest, Session, SessionActions};
use crate::settings::{ChangeType, Settings};
use crate::skip::{self, SkipState, SkipValue};
use crate::sound::SoundSlot;
use crate::types::{
    ConversationId, ConversationInfo, FullMsgId, IncomingMessage, MsgId, PeerId, TextWithTags,
    Time,
};
use crate::{NotifyError, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// What one timer firing did
#[derive(Debug, Default)]
pub struct TimerReport {
    /// Alerts handed to the backend
    pub shown: usize,
    /// Alerts folded into a pending forwarded run
    pub deferred: usize,
    /// Waiters dropped because the skip policy changed its mind
    pub skipped: usize,
    /// Waiters parked because the policy became undecided
    pub parked: usize,
    pub sound_played: bool,
    /// Distinct senders behind the consumed alerts
    pub alerted_peers: usize,
    /// Backend failures, one per failed presentation
    pub errors: Vec<NotifyError>,
}

impl TimerReport {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn is_idle(&self) -> bool {
        self.shown == 0
            && self.deferred == 0
            && self.skipped == 0
            && self.parked == 0
            && self.errors.is_empty()
    }

    fn record(&mut self, result: Result<ShowOutcome>) {
        match result {
            Ok(ShowOutcome::Presented) => self.shown += 1,
            Ok(ShowOutcome::Deferred(_)) => self.deferred += 1,
            Err(e) => {
                warn!("Failed to show notification: {}", e);
                self.errors.push(e);
            }
        }
    }
}

/// Due waiter that passed the skip policy at fire time
struct ReadyWaiter {
    waiter: Waiter,
    info: ConversationInfo,
    silent: bool,
}

pub struct Engine {
    config: EngineConfig,
    settings: Settings,
    session: Rc<dyn Session>,
    actions: Option<Box<dyn SessionActions>>,
    registry: WaiterRegistry,
    alerts: AlertLedger,
    clock: AlertClock,
    dispatcher: Dispatcher,
    sound: SoundSlot,
    bus: SettingsBus,
    inbox: Rc<RefCell<VecDeque<ChangeType>>>,
    _settings_subscription: Subscription,
}

impl Engine {
    /// Create an engine for one session
    ///
    /// Fails only if `config` cannot guarantee the grouping bound.
    pub fn new(
        config: EngineConfig,
        settings: Settings,
        session: Rc<dyn Session>,
        backend: Box<dyn DisplayBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let bus = SettingsBus::new();
        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        let sink = inbox.clone();
        let subscription = bus.subscribe(move |kind| sink.borrow_mut().push_back(kind));

        let dispatcher = Dispatcher::new(backend, config.forward_group_wait_ms);
        info!(
            "Notification engine started with {} backend",
            dispatcher.backend_name()
        );

        Ok(Self {
            config,
            settings,
            session,
            actions: None,
            registry: WaiterRegistry::new(),
            alerts: AlertLedger::new(),
            clock: AlertClock::new(),
            dispatcher,
            sound: SoundSlot::disabled(),
            bus,
            inbox,
            _settings_subscription: subscription,
        })
    }

    pub fn with_sound(mut self, sound: SoundSlot) -> Self {
        self.sound = sound;
        self
    }

    pub fn with_actions(mut self, actions: Box<dyn SessionActions>) -> Self {
        self.actions = Some(actions);
        self
    }

    /// Title shown instead of conversation names when those are hidden
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.dispatcher.set_app_name(app_name);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &WaiterRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Alerts recorded but not consumed by a sound pass yet
    pub fn pending_alerts(&self) -> usize {
        self.alerts.len()
    }

    pub fn bus(&self) -> &SettingsBus {
        &self.bus
    }

    /// Listen to settings changes made through this engine
    pub fn subscribe_settings<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(ChangeType) + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn wait_deadline(&self) -> Option<Time> {
        self.clock.wait.deadline()
    }

    pub fn grouping_deadline(&self) -> Option<Time> {
        self.clock.grouping.deadline()
    }

    /// Earliest time at which `on_timer` has work to do
    pub fn next_deadline(&self) -> Option<Time> {
        self.clock.next_deadline()
    }

    /// Check the registry invariants
    pub fn verify(&self) -> Result<()> {
        self.registry.verify()
    }


    /// Consider a newly arrived message for an alert
    pub fn schedule(&mut self, message: IncomingMessage, now: Time) -> SkipState {
        self.apply_settings_changes();
        let state = self.admit(message, now);
        self.rearm();
        state
    }

    /// Retry every message parked while its skip policy was undecided
    pub fn check_delayed(&mut self, now: Time) {
        self.apply_settings_changes();
        let parked = self.registry.take_all_parked();
        if parked.is_empty() {
            return;
        }
        debug!("Re-checking {} delayed messages at {}", parked.len(), now);
        for pending in parked {
            self.admit(pending.message, pending.arrival);
        }
        self.rearm();
    }

    /// Mute state or metadata of one conversation changed
    pub fn conversation_settings_changed(&mut self, conversation: ConversationId, now: Time) {
        self.apply_settings_changes();
        debug!("Settings of {} changed at {}", conversation, now);
        self.reevaluate_conversation(conversation);
        for pending in self.registry.take_parked(conversation) {
            self.admit(pending.message, pending.arrival);
        }
        self.rearm();
    }

    /// Mute state of one sender changed
    ///
    /// Waiters holding a message from `peer` are re-checked right away, then
    /// parked messages are retried.
    pub fn peer_settings_changed(&mut self, peer: PeerId, now: Time) {
        self.apply_settings_changes();
        let affected: Vec<ConversationId> = self
            .registry
            .iter()
            .filter(|waiter| waiter.messages().iter().any(|p| p.message.sender == peer))
            .map(|waiter| waiter.conversation)
            .collect();
        debug!(
            "Mute of {} changed at {}, {} waiters affected",
            peer,
            now,
            affected.len()
        );
        for conversation in affected {
            self.reevaluate_conversation(conversation);
        }
        for pending in self.registry.take_all_parked() {
            self.admit(pending.message, pending.arrival);
        }
        self.rearm();
    }

    fn evaluate(&self, message: &IncomingMessage) -> SkipState {
        let conversation = self.session.conversation(message.conversation);
        skip::evaluate(
            message,
            conversation.as_ref(),
            self.session.peer_mute(message.sender),
            &self.settings,
        )
    }

    fn admit(&mut self, message: IncomingMessage, arrival: Time) -> SkipState {
        let state = self.evaluate(&message);
        match state.value {
            SkipValue::Skip => debug!("Skipping {}", message.full_id()),
            SkipValue::Unknown => self.registry.park(message, arrival),
            SkipValue::DontSkip => {
                let conversation = message.conversation;
                let peer = message.sender;
                let upserted = self
                    .registry
                    .upsert(message, arrival, state.silent, &self.config);
                self.alerts.record(
                    conversation,
                    upserted.due(),
                    Alert {
                        peer,
                        silent: state.silent,
                    },
                );
            }
        }
        state
    }

    fn reevaluate_conversation(&mut self, conversation: ConversationId) {
        let session = &self.session;
        let settings = &self.settings;
        let info = session.conversation(conversation);
        let result = self.registry.reevaluate(conversation, |message| {
            skip::evaluate(
                message,
                info.as_ref(),
                session.peer_mute(message.sender),
                settings,
            )
        });
        if result.removed {
            debug!("Waiter for {} dropped on re-evaluation", conversation);
            self.alerts.remove_conversation(conversation);
        }
    }

    fn reevaluate_all(&mut self) {
        for conversation in self.registry.conversations() {
            self.reevaluate_conversation(conversation);
        }
        for pending in self.registry.take_all_parked() {
            self.admit(pending.message, pending.arrival);
        }
    }


    fn rearm(&mut self) {
        let wait = self.registry.peek_earliest().map(|w| w.due);
        let grouping = match (
            self.registry.earliest_extended_due(),
            self.dispatcher.forward_deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.clock.rearm(wait, grouping);
    }

    /// Run whichever timers are due at `now`
    pub fn on_timer(&mut self, now: Time) -> TimerReport {
        self.apply_settings_changes();
        let mut report = TimerReport::default();

        if self.clock.grouping.is_due(now) {
            self.run_grouped(now, &mut report);
        }
        while self.clock.wait.is_due(now) {
            self.run_next(now, &mut report);
        }

        if !report.is_idle() {
            debug!(
                "Timer at {}: shown={} deferred={} skipped={} failed={}",
                now,
                report.shown,
                report.deferred,
                report.skipped,
                report.failed()
            );
        }
        report
    }

    /// Fire the single earliest due waiter
    pub fn show_next(&mut self, now: Time) -> TimerReport {
        let mut report = TimerReport::default();
        self.run_next(now, &mut report);
        report
    }

    /// Fire every due waiter in (due time, conversation) order
    pub fn show_grouped(&mut self, now: Time) -> TimerReport {
        let mut report = TimerReport::default();
        self.run_grouped(now, &mut report);
        report
    }

    fn run_next(&mut self, now: Time, report: &mut TimerReport) {
        let ready = self
            .registry
            .pop_due(now)
            .and_then(|waiter| self.recheck(waiter, report));
        self.sound_pass(now, report);
        if let Some(ready) = ready {
            self.present(ready, now, report);
        }
        self.rearm();
    }

    fn run_grouped(&mut self, now: Time, report: &mut TimerReport) {
        let ready: Vec<ReadyWaiter> = self
            .registry
            .take_due(now)
            .into_iter()
            .filter_map(|waiter| self.recheck(waiter, report))
            .collect();
        self.sound_pass(now, report);
        for waiter in ready {
            self.present(waiter, now, report);
        }

        let ctx = RenderContext {
            settings: &self.settings,
            locked: self.session.is_locked(),
        };
        match self.dispatcher.flush_due(now, ctx) {
            Ok(true) => report.shown += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to show forwarded messages: {}", e);
                report.errors.push(e);
            }
        }
        self.rearm();
    }

    fn sound_pass(&mut self, now: Time, report: &mut TimerReport) {
        let pass = self.alerts.pass(now, self.config.alert_coalesce_ms);
        if pass.consumed == 0 {
            return;
        }
        report.alerted_peers += pass.distinct_peers;
        if pass.audible && self.settings.sound_enabled && self.sound.play() {
            report.sound_played = true;
        }
        debug!(
            "Alert pass at {}: {} alerts from {} peers, audible={}",
            now, pass.consumed, pass.distinct_peers, pass.audible
        );
    }

    /// Re-run the skip policy on a due waiter
    ///
    /// Skipped and undecided waiters lose their alert entries here, before the
    /// sound pass can count them.
    fn recheck(&mut self, waiter: Waiter, report: &mut TimerReport) -> Option<ReadyWaiter> {
        let conversation = waiter.conversation;
        let info = self.session.conversation(conversation);
        let state = skip::evaluate(
            waiter.message(),
            info.as_ref(),
            self.session.peer_mute(waiter.message().sender),
            &self.settings,
        );

        match (state.value, info) {
            (SkipValue::DontSkip, Some(info)) => Some(ReadyWaiter {
                waiter,
                info,
                silent: state.silent,
            }),
            (SkipValue::Unknown, _) => {
                debug!("Policy for {} undecided at fire time, parking", conversation);
                self.alerts.remove_conversation(conversation);
                for pending in waiter.messages() {
                    self.registry.park(pending.message.clone(), pending.arrival);
                }
                report.parked += 1;
                None
            }
            _ => {
                debug!("Dropping waiter for {}: skipped at fire time", conversation);
                self.alerts.remove_conversation(conversation);
                report.skipped += 1;
                None
            }
        }
    }

    fn present(&mut self, ready: ReadyWaiter, now: Time, report: &mut TimerReport) {
        let ReadyWaiter {
            waiter,
            info,
            silent,
        } = ready;
        let message = waiter.message().clone();
        let peer = waiter.notifying_peer();
        let messages = waiter.messages();
        let proximity = self.config.forward_proximity_ms();
        let run = waiter.forwarded_run(proximity) as usize;
        let forwarded_count = if run > 0 {
            let first_of_run = &messages[messages.len() - run].message;
            self.dispatcher
                .pending_forward_count(first_of_run, peer, proximity)
                + run as u32
        } else {
            0
        };
        let request = ShowRequest {
            message,
            conversation: info,
            peer,
            forwarded_count,
            absorbed: messages.len() - run.max(1),
            silent: waiter.silent() || silent,
        };

        let ctx = RenderContext {
            settings: &self.settings,
            locked: self.session.is_locked(),
        };
        report.record(self.dispatcher.show(request, now, ctx));
    }


    /// Forget everything pending or displayed for `conversation`
    pub fn clear_from_conversation(&mut self, conversation: ConversationId) {
        self.registry.remove(conversation);
        self.alerts.remove_conversation(conversation);
        self.dispatcher.clear_conversation(conversation);
        self.rearm();
    }

    /// A message was deleted
    pub fn clear_from_item(&mut self, conversation: ConversationId, msg: MsgId) {
        if self.registry.remove_message(conversation, msg) {
            self.alerts.remove_conversation(conversation);
        }
        self.dispatcher
            .clear_message(FullMsgId::new(conversation, msg));
        self.rearm();
    }

    /// Messages up to and including `up_to` were read elsewhere
    pub fn mark_read(&mut self, conversation: ConversationId, up_to: MsgId, now: Time) {
        debug!("{} read up to {} at {}", conversation, up_to, now);
        if self.registry.remove_read(conversation, up_to) {
            self.alerts.remove_conversation(conversation);
        }
        self.dispatcher.clear_read(conversation, up_to);
        self.rearm();
    }

    /// Drop all pending state and dismiss displayed alerts one by one
    pub fn clear_all(&mut self) {
        info!("Clearing all notifications");
        self.reset();
        self.dispatcher.clear_all(false);
    }

    /// Drop all pending state and tear down the backend immediately
    pub fn clear_all_fast(&mut self) {
        info!("Clearing all notifications (fast)");
        self.reset();
        self.dispatcher.clear_all(true);
    }

    fn reset(&mut self) {
        self.registry.clear();
        self.alerts.clear();
        self.clock.disarm();
    }

    /// Re-render displayed alerts under the current settings
    pub fn update_all(&mut self) {
        let ctx = RenderContext {
            settings: &self.settings,
            locked: self.session.is_locked(),
        };
        self.dispatcher.update_all(ctx);
    }


    /// Modify the settings snapshot and broadcast `kind`
    pub fn change_settings<F>(&mut self, kind: ChangeType, update: F)
    where
        F: FnOnce(&mut Settings),
    {
        update(&mut self.settings);
        self.bus.publish(kind);
        self.apply_settings_changes();
    }

    /// React to every change kind published since the last call
    pub fn apply_settings_changes(&mut self) {
        let mut changed = false;
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some(kind) = next else {
                break;
            };
            self.apply_change(kind);
            changed = true;
        }
        if changed {
            self.rearm();
        }
    }

    fn apply_change(&mut self, kind: ChangeType) {
        debug!("Applying settings change {:?}", kind);
        match kind {
            ChangeType::SoundEnabled | ChangeType::IncludeMuted => self.reevaluate_all(),
            ChangeType::DesktopEnabled => {
                if !self.settings.desktop_enabled {
                    self.dispatcher.clear_all(false);
                }
                self.reevaluate_all();
            }
            ChangeType::CountMessages | ChangeType::ViewParams => self.update_all(),
            ChangeType::Corner => {
                self.dispatcher.apply_settings(&self.settings);
                self.update_all();
            }
            ChangeType::MaxCount => self.dispatcher.apply_settings(&self.settings),
            ChangeType::DemoIsShown => {
                if self.settings.demo_shown {
                    let ctx = RenderContext {
                        settings: &self.settings,
                        locked: self.session.is_locked(),
                    };
                    if let Err(e) = self.dispatcher.show_demo(ctx) {
                        warn!("Failed to show sample notification: {}", e);
                    }
                } else {
                    self.dispatcher.hide_demo();
                }
            }
        }
    }


    /// The user clicked an alert
    pub fn notification_activated(
        &mut self,
        conversation: ConversationId,
        msg: MsgId,
    ) -> Result<()> {
        if self.session.is_locked() {
            info!("Notification activated while locked");
            self.clear_all();
            return Ok(());
        }

        self.clear_from_conversation(conversation);
        let actions = self.actions.as_mut().ok_or_else(|| {
            NotifyError::Action(format!("no handler to open {}", conversation))
        })?;
        actions.open_conversation(conversation, msg)
    }

    /// The user typed a reply into an alert
    pub fn notification_replied(
        &mut self,
        conversation: ConversationId,
        msg: MsgId,
        reply: TextWithTags,
    ) -> Result<()> {
        if reply.is_empty() {
            debug!("Ignoring empty reply to {}/{}", conversation, msg);
            return Ok(());
        }
        let Some(info) = self.session.conversation(conversation) else {
            debug!("Ignoring reply to unknown {}", conversation);
            return Ok(());
        };

        let request = ReplyRequest {
            conversation,
            text: reply,
            reply_to: (!info.is_private()).then_some(msg),
        };
        let actions = self.actions.as_mut().ok_or_else(|| {
            NotifyError::Action(format!("no handler to reply in {}", conversation))
        })?;
        actions.send_reply(request)?;

        self.clear_from_conversation(conversation);
        Ok(())
    }

    /// Session teardown
    pub fn shutdown(&mut self) {
        info!("Notification engine shutting down");
        self.reset();
        self.dispatcher.shutdown();
    }
}
