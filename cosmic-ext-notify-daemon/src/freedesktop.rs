//! Freedesktop Notifications Backend
//!
//! Displays alerts through the org.freedesktop.Notifications DBus interface.
//!
//! The engine calls its backend synchronously, so [`FreedesktopBackend`] only
//! queues commands. A worker task owns the DBus connection, sends `Notify` and
//! `CloseNotification` calls, keeps the notification id of every displayed
//! message and turns `ActionInvoked` / `NotificationReplied` signals back into
//! [`EngineEvent`]s.
//!
//! ## Capabilities
//!
//! | Capability          | Supported | Notes                                      |
//! |---------------------|-----------|--------------------------------------------|
//! | per-item clear      | yes       | through the recorded notification id       |
//! | incremental update  | no        | `update_all` closes everything             |
//! | animated clear      | no        | servers animate on their own               |
//! | delivery report     | no        | see below                                  |
//!
//! `show_notification` succeeds once the command is queued. A failing `Notify`
//! call is logged by the worker and never reaches the engine, so its timer
//! reports count every queued alert as shown. Only a stopped worker surfaces as
//! [`NotifyError::BackendUnavailable`].

use crate::config::BackendConfig;
use anyhow::{Context, Result};
use cosmic_ext_notify::{
    Capabilities, ConversationId, DisplayBackend, EngineEvent, FullMsgId, NotifyError,
    Presentation, TextWithTags,
};
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::zvariant::Value;
use zbus::Connection;

const NOTIFICATIONS_NAME: &str = "org.freedesktop.Notifications";
const NOTIFICATIONS_PATH: &str = "/org/freedesktop/Notifications";

/// Action key the server reports when the alert body is clicked
pub const DEFAULT_ACTION: &str = "default";

/// Action key for servers supporting inline replies
pub const REPLY_ACTION: &str = "inline-reply";

/// Notification urgency level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low = 0,
    Normal = 1,
}

/// Parameters of a `Notify` call
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    app_name: String,
    summary: String,
    body: String,
    icon: String,
    urgency: Urgency,
    timeout: i32,
    actions: Vec<(String, String)>,
    hints: HashMap<String, Value<'static>>,
}

impl NotificationBuilder {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            app_name: cosmic_ext_notify::dispatcher::DEFAULT_APP_NAME.to_string(),
            summary: summary.into(),
            body: String::new(),
            icon: "mail-unread-symbolic".to_string(),
            urgency: Urgency::Normal,
            timeout: -1,
            actions: Vec::new(),
            hints: HashMap::new(),
        }
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// Expiry in milliseconds, -1 leaves it to the server
    pub fn timeout(mut self, timeout_ms: i32) -> Self {
        self.timeout = timeout_ms;
        self
    }

    /// Add an action button
    pub fn action(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.actions.push((id.into(), label.into()));
        self
    }

    pub fn hint(mut self, key: impl Into<String>, value: Value<'static>) -> Self {
        self.hints.insert(key.into(), value);
        self
    }

    fn build(mut self) -> NotificationParams {
        self.hints
            .insert("urgency".to_string(), Value::U8(self.urgency as u8));
        self.hints
            .insert("category".to_string(), Value::Str("im.received".into()));

        let actions_flat: Vec<String> = self
            .actions
            .into_iter()
            .flat_map(|(id, label)| vec![id, label])
            .collect();

        NotificationParams {
            app_name: self.app_name,
            icon: self.icon,
            summary: self.summary,
            body: self.body,
            actions: actions_flat,
            hints: self.hints,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug)]
struct NotificationParams {
    app_name: String,
    icon: String,
    summary: String,
    body: String,
    actions: Vec<String>,
    hints: HashMap<String, Value<'static>>,
    timeout: i32,
}

/// Turn a rendered alert into `Notify` parameters
pub fn notification_for(presentation: &Presentation, config: &BackendConfig) -> NotificationBuilder {
    let body = if presentation.subtitle.is_empty() {
        presentation.body.clone()
    } else {
        format!("{}: {}", presentation.subtitle, presentation.body)
    };

    let mut builder = NotificationBuilder::new(presentation.title.clone())
        .app_name(config.app_name.clone())
        .body(body)
        .icon(config.icon.clone())
        .timeout(config.timeout_ms)
        .action(DEFAULT_ACTION, "Open");

    if presentation.silent {
        builder = builder
            .urgency(Urgency::Low)
            .hint("suppress-sound", Value::Bool(true));
    }

    if !presentation.options.hide_reply_button {
        builder = builder.action(REPLY_ACTION, "Reply");
    }
    builder
}

#[derive(Debug)]
enum Command {
    Show {
        id: FullMsgId,
        params: NotificationParams,
    },
    ClearConversation(ConversationId),
    ClearItem(FullMsgId),
    ClearAll,
}

/// Display backend talking to the session notification server
pub struct FreedesktopBackend {
    commands: mpsc::UnboundedSender<Command>,
    config: BackendConfig,
}

impl FreedesktopBackend {
    /// Connect to the session bus and start the worker
    ///
    /// Activations and replies are sent to `events`. The returned handle
    /// finishes once the backend is dropped and its queue is drained.
    pub async fn connect(
        config: &BackendConfig,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let connection = Connection::session()
            .await
            .context("Failed to connect to session DBus")?;

        let proxy = zbus::Proxy::new(
            &connection,
            NOTIFICATIONS_NAME,
            NOTIFICATIONS_PATH,
            NOTIFICATIONS_NAME,
        )
        .await
        .context("Failed to create notifications proxy")?;

        let signals = subscribe_signals(&connection).await?;
        let (commands, queue) = mpsc::unbounded_channel();

        let worker = NotificationWorker {
            proxy,
            ids: NotificationIds::default(),
        };
        let handle = tokio::spawn(worker.run(queue, signals, events));

        info!("Connected to {}", NOTIFICATIONS_NAME);
        Ok((
            Self {
                commands,
                config: config.clone(),
            },
            handle,
        ))
    }

    fn send(&self, command: Command) -> cosmic_ext_notify::Result<()> {
        self.commands
            .send(command)
            .map_err(|_| NotifyError::BackendUnavailable("notification worker stopped".to_string()))
    }
}

impl DisplayBackend for FreedesktopBackend {
    fn name(&self) -> &str {
        "freedesktop"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            incremental_update: false,
            per_item_clear: true,
            animated_clear: false,
        }
    }

    fn show_notification(&mut self, presentation: &Presentation) -> cosmic_ext_notify::Result<()> {
        let params = notification_for(presentation, &self.config).build();
        self.send(Command::Show {
            id: presentation.id(),
            params,
        })
    }

    fn clear_all_fast(&mut self) {
        if let Err(e) = self.send(Command::ClearAll) {
            debug!("Skipping clear: {}", e);
        }
    }

    fn clear_from_conversation(&mut self, conversation: ConversationId) {
        if let Err(e) = self.send(Command::ClearConversation(conversation)) {
            debug!("Skipping clear of {}: {}", conversation, e);
        }
    }

    fn clear_from_item(&mut self, id: FullMsgId) {
        if let Err(e) = self.send(Command::ClearItem(id)) {
            debug!("Skipping clear of {}: {}", id, e);
        }
    }
}

/// Signal emitted by the notification server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSignal {
    ActionInvoked { id: u32, action: String },
    Replied { id: u32, text: String },
    Closed { id: u32 },
}

/// Server notification ids of displayed messages
#[derive(Debug, Default)]
pub struct NotificationIds {
    by_id: HashMap<u32, FullMsgId>,
    by_message: HashMap<FullMsgId, u32>,
}

impl NotificationIds {
    pub fn record(&mut self, notification_id: u32, message: FullMsgId) {
        if let Some(previous) = self.by_message.insert(message, notification_id) {
            if previous != notification_id {
                self.by_id.remove(&previous);
            }
        }
        self.by_id.insert(notification_id, message);
    }

    /// Id to pass as `replaces_id` when `message` is shown again
    pub fn replaces(&self, message: FullMsgId) -> u32 {
        self.by_message.get(&message).copied().unwrap_or(0)
    }

    pub fn message(&self, notification_id: u32) -> Option<FullMsgId> {
        self.by_id.get(&notification_id).copied()
    }

    pub fn forget(&mut self, notification_id: u32) -> Option<FullMsgId> {
        let message = self.by_id.remove(&notification_id)?;
        self.by_message.remove(&message);
        Some(message)
    }

    pub fn take_message(&mut self, message: FullMsgId) -> Option<u32> {
        let notification_id = self.by_message.remove(&message)?;
        self.by_id.remove(&notification_id);
        Some(notification_id)
    }

    pub fn take_conversation(&mut self, conversation: ConversationId) -> Vec<u32> {
        let ids: Vec<u32> = self
            .by_id
            .iter()
            .filter(|(_, m)| m.conversation == conversation)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.forget(*id);
        }
        ids
    }

    pub fn take_all(&mut self) -> Vec<u32> {
        self.by_message.clear();
        self.by_id.drain().map(|(id, _)| id).collect()
    }

    /// Map a server signal to an engine event
    pub fn translate(&mut self, signal: ServerSignal) -> Option<EngineEvent> {
        match signal {
            ServerSignal::ActionInvoked { id, action } if action == DEFAULT_ACTION => {
                let message = self.message(id)?;
                Some(EngineEvent::NotificationActivated {
                    conversation: message.conversation,
                    msg: message.msg,
                })
            }
            ServerSignal::ActionInvoked { .. } => None,
            ServerSignal::Replied { id, text } => {
                let message = self.message(id)?;
                Some(EngineEvent::NotificationReplied {
                    conversation: message.conversation,
                    msg: message.msg,
                    reply: TextWithTags::plain(text),
                })
            }
            ServerSignal::Closed { id } => {
                self.forget(id);
                None
            }
        }
    }
}

struct NotificationWorker {
    proxy: zbus::Proxy<'static>,
    ids: NotificationIds,
}

impl NotificationWorker {
    async fn run<S>(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: S,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) where
        S: Stream<Item = ServerSignal> + Unpin,
    {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle(command).await;
                }
                Some(signal) = signals.next() => {
                    if let Some(event) = self.ids.translate(signal) {
                        if events.send(event).is_err() {
                            debug!("Engine gone, dropping server signal");
                        }
                    }
                }
            }
        }
        debug!("Notification worker stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Show { id, params } => match self.notify(id, params).await {
                Ok(notification_id) => self.ids.record(notification_id, id),
                Err(e) => warn!("Failed to show notification for {}: {:#}", id, e),
            },
            Command::ClearConversation(conversation) => {
                for notification_id in self.ids.take_conversation(conversation) {
                    self.close(notification_id).await;
                }
            }
            Command::ClearItem(id) => {
                if let Some(notification_id) = self.ids.take_message(id) {
                    self.close(notification_id).await;
                }
            }
            Command::ClearAll => {
                for notification_id in self.ids.take_all() {
                    self.close(notification_id).await;
                }
            }
        }
    }

    async fn notify(&self, id: FullMsgId, params: NotificationParams) -> Result<u32> {
        let notification_id: u32 = self
            .proxy
            .call_method(
                "Notify",
                &(
                    &params.app_name,
                    self.ids.replaces(id),
                    &params.icon,
                    &params.summary,
                    &params.body,
                    &params.actions,
                    &params.hints,
                    params.timeout,
                ),
            )
            .await
            .context("Failed to send notification")?
            .body()
            .deserialize()
            .context("Failed to parse notification ID")?;

        debug!("Sent notification for {} with ID {}", id, notification_id);
        Ok(notification_id)
    }

    async fn close(&self, notification_id: u32) {
        if let Err(e) = self
            .proxy
            .call_method("CloseNotification", &(notification_id,))
            .await
        {
            debug!("Failed to close notification {}: {}", notification_id, e);
        }
    }
}

/// Stream of the server signals the worker reacts to
async fn subscribe_signals(
    connection: &Connection,
) -> Result<impl Stream<Item = ServerSignal> + Unpin> {
    let mut stream = zbus::MessageStream::for_match_rule(
        zbus::MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .interface(NOTIFICATIONS_NAME)?
            .path(NOTIFICATIONS_PATH)?
            .build(),
        connection,
        Some(64),
    )
    .await
    .context("Failed to create message stream")?;

    let signal_stream = async_stream::stream! {
        while let Some(msg_result) = stream.next().await {
            let Ok(msg) = msg_result else {
                continue;
            };
            let header = msg.header();
            let Some(member) = header.member() else {
                continue;
            };
            let signal = match member.as_str() {
                "ActionInvoked" => msg
                    .body()
                    .deserialize::<(u32, String)>()
                    .ok()
                    .map(|(id, action)| ServerSignal::ActionInvoked { id, action }),
                "NotificationReplied" => msg
                    .body()
                    .deserialize::<(u32, String)>()
                    .ok()
                    .map(|(id, text)| ServerSignal::Replied { id, text }),
                "NotificationClosed" => msg
                    .body()
                    .deserialize::<(u32, u32)>()
                    .ok()
                    .map(|(id, _reason)| ServerSignal::Closed { id }),
                _ => None,
            };
            if let Some(signal) = signal {
                debug!("Notification server signal: {:?}", signal);
                yield signal;
            }
        }
    };

    Ok(Box::pin(signal_stream))
}
