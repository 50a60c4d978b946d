//! Client protocol
//!
//! The client feeds [`EngineEvent`]s as JSON lines on stdin. Requests the
//! engine makes back to the client (open a conversation, send a reply) are
//! written as JSON lines on stdout.
//!
//! ```text
//! {"event": "conversation_updated", "conversation": 1, "info": {"title": "Team", "kind": "group", "mute": "unmuted"}}
//! {"event": "message_arrived", "message": {"conversation": 1, "id": 10, "sender": 7, "text": "hi"}}
//! {"event": "read_up_to", "conversation": 1, "up_to": 10}
//! ```

use anyhow::{Context, Result};
use cosmic_ext_notify::{
    ConversationId, EngineEvent, MsgId, ReplyRequest, SessionActions, TextWithTags,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Decode one input line; blank lines and `#` comments yield `None`
pub fn parse_line(line: &str) -> Result<Option<EngineEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let event = serde_json::from_str(line)
        .with_context(|| format!("Invalid event line: {}", line))?;
    Ok(Some(event))
}

/// Forward events from `input` until EOF, then request shutdown
pub async fn read_events<R>(input: R, events: mpsc::UnboundedSender<EngineEvent>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        match parse_line(&line) {
            Ok(Some(event)) => {
                debug!("Client event: {:?}", event);
                if events.send(event).is_err() {
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{:#}", e),
        }
    }

    info!("Client input closed");
    let _ = events.send(EngineEvent::Shutdown);
    Ok(())
}

/// Request sent back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    OpenConversation {
        conversation: ConversationId,
        msg: MsgId,
    },
    SendReply {
        conversation: ConversationId,
        text: TextWithTags,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<MsgId>,
    },
}

impl From<ReplyRequest> for ClientAction {
    fn from(reply: ReplyRequest) -> Self {
        ClientAction::SendReply {
            conversation: reply.conversation,
            text: reply.text,
            reply_to: reply.reply_to,
        }
    }
}

/// Writes client actions as JSON lines
pub struct JsonLinesActions<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesActions<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, action: &ClientAction) -> cosmic_ext_notify::Result<()> {
        serde_json::to_writer(&mut self.out, action)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

impl JsonLinesActions<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> SessionActions for JsonLinesActions<W> {
    fn open_conversation(
        &mut self,
        conversation: ConversationId,
        msg: MsgId,
    ) -> cosmic_ext_notify::Result<()> {
        self.emit(&ClientAction::OpenConversation { conversation, msg })
    }

    fn send_reply(&mut self, reply: ReplyRequest) -> cosmic_ext_notify::Result<()> {
        self.emit(&reply.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   # comment").unwrap().is_none());
        assert_eq!(
            parse_line(r#"{"event": "check_delayed"}"#).unwrap(),
            Some(EngineEvent::CheckDelayed)
        );
        assert!(parse_line(r#"{"event": "explode"}"#).is_err());
    }

    #[test]
    fn test_actions_written_as_json_lines() {
        let mut actions = JsonLinesActions::new(Vec::new());
        actions
            .open_conversation(ConversationId(4), MsgId(12))
            .unwrap();
        actions
            .send_reply(ReplyRequest {
                conversation: ConversationId(4),
                text: TextWithTags::plain("thanks"),
                reply_to: None,
            })
            .unwrap();

        let output = String::from_utf8(actions.out).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"action":"open_conversation","conversation":4,"msg":12}"#
        );

        let reply: ClientAction = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(
            reply,
            ClientAction::SendReply {
                conversation: ConversationId(4),
                text: TextWithTags::plain("thanks"),
                reply_to: None,
            }
        );
    }

    #[tokio::test]
    async fn test_read_events_until_eof() {
        let input: &[u8] = b"{\"event\": \"check_delayed\"}\nnot json\n\n{\"event\": \"clear_all\", \"fast\": true}\n";
        let (tx, mut rx) = mpsc::unbounded_channel();

        read_events(input, tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(EngineEvent::CheckDelayed));
        assert_eq!(rx.recv().await, Some(EngineEvent::ClearAll { fast: true }));
        assert_eq!(rx.recv().await, Some(EngineEvent::Shutdown));
        assert_eq!(rx.recv().await, None);
    }
}
