//! Command handling for the echo bot.
//!
//! The handler runs on the sync loop's task, so it only parses commands and
//! queues replies; a separate task performs the sends.

use matrix_client::{EventHandler, MatrixClient};
use matrix_core::{MessageContent, MessageEvent, ReactionContent, ReactionEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DEFAULT_REACTION: &str = "👍";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `!echo <text>`: reply with the text.
    Echo(&'a str),
    /// `!react [key]`: annotate the command message.
    React(&'a str),
    /// `!ping`: answer with a notice.
    Ping,
}

pub fn parse_command(body: &str) -> Option<Command<'_>> {
    let body = body.trim();
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    match name {
        "!echo" if !rest.is_empty() => Some(Command::Echo(rest)),
        "!react" if rest.is_empty() => Some(Command::React(DEFAULT_REACTION)),
        "!react" => Some(Command::React(rest)),
        "!ping" => Some(Command::Ping),
        _ => None,
    }
}

/// An outbound event queued by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Message {
        room_id: String,
        content: MessageContent,
    },
    Reaction {
        room_id: String,
        content: ReactionContent,
    },
}

pub struct EchoHandler {
    own_user_id: String,
    replies: mpsc::Sender<Reply>,
}

impl EchoHandler {
    pub fn new(own_user_id: impl Into<String>, replies: mpsc::Sender<Reply>) -> Self {
        Self {
            own_user_id: own_user_id.into(),
            replies,
        }
    }

    fn queue(&self, reply: Reply) {
        if let Err(err) = self.replies.try_send(reply) {
            warn!(error = %err, "dropping reply, send queue unavailable");
        }
    }
}

impl EventHandler for EchoHandler {
    fn on_message(&mut self, event: MessageEvent) {
        if event.meta.sender == self.own_user_id {
            return;
        }
        let Some(command) = parse_command(&event.content.body) else {
            return;
        };
        debug!(
            room_id = %event.meta.room_id,
            event_id = %event.meta.event_id,
            ?command,
            "command received"
        );

        let room_id = event.meta.room_id.clone();
        let reply = match command {
            Command::Echo(text) => Reply::Message {
                room_id,
                content: MessageContent::text(text).in_reply_to(event.meta.event_id.clone()),
            },
            Command::React(key) => Reply::Reaction {
                room_id,
                content: ReactionContent::annotation(event.meta.event_id.clone(), key),
            },
            Command::Ping => Reply::Message {
                room_id,
                content: MessageContent::notice("pong"),
            },
        };
        self.queue(reply);
    }

    fn on_reaction(&mut self, event: ReactionEvent) {
        debug!(
            sender = %event.meta.sender,
            target = %event.content.relates_to.event_id,
            key = %event.content.relates_to.key,
            "reaction seen"
        );
    }
}

/// Send queued replies until every handler side of the queue is dropped.
pub async fn send_replies(client: MatrixClient, mut replies: mpsc::Receiver<Reply>) {
    while let Some(reply) = replies.recv().await {
        let result = match &reply {
            Reply::Message { room_id, content } => client.send_message(room_id, content).await,
            Reply::Reaction { room_id, content } => client.send_reaction(room_id, content).await,
        };
        match result {
            Ok(event_id) => info!(%event_id, "reply sent"),
            Err(err) => warn!(error = %err, code = err.code(), "reply not sent"),
        }
    }
    debug!("reply queue closed");
}

#[cfg(test)]
mod tests {
    use matrix_core::OpaqueEvent;
    use serde_json::json;

    use super::*;

    fn message(sender: &str, body: &str) -> MessageEvent {
        let raw = serde_json::to_vec(&json!({
            "type": "m.room.message",
            "event_id": "$cmd",
            "sender": sender,
            "room_id": "!room:example.org",
            "origin_server_ts": 1,
            "content": { "msgtype": "m.text", "body": body }
        }))
        .expect("serialize event");
        OpaqueEvent::decode(&raw)
            .expect("valid envelope")
            .as_message()
            .expect("valid message")
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("!echo  hello world "), Some(Command::Echo("hello world")));
        assert_eq!(parse_command("!echo"), None);
        assert_eq!(parse_command("!react"), Some(Command::React("👍")));
        assert_eq!(parse_command("!react 🎉"), Some(Command::React("🎉")));
        assert_eq!(parse_command(" !ping "), Some(Command::Ping));
        assert_eq!(parse_command("echo hello"), None);
        assert_eq!(parse_command("!echoes x"), None);
    }

    #[test]
    fn queues_reply_to_echo_command() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut handler = EchoHandler::new("@bot:example.org", tx);

        handler.on_message(message("@alice:example.org", "!echo hi there"));

        match rx.try_recv().expect("reply queued") {
            Reply::Message { room_id, content } => {
                assert_eq!(room_id, "!room:example.org");
                assert_eq!(content.body, "hi there");
                assert_eq!(content.reply_target(), Some("$cmd"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn ignores_own_messages_and_chatter() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut handler = EchoHandler::new("@bot:example.org", tx);

        handler.on_message(message("@bot:example.org", "!echo loop"));
        handler.on_message(message("@alice:example.org", "just talking"));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn drops_replies_when_queue_is_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut handler = EchoHandler::new("@bot:example.org", tx);

        handler.on_message(message("@alice:example.org", "!react"));
        handler.on_message(message("@alice:example.org", "!ping"));

        match rx.try_recv().expect("first reply queued") {
            Reply::Reaction { content, .. } => {
                assert_eq!(content, ReactionContent::annotation("$cmd", "👍"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
