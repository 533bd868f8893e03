//! Inbound events.
//!
//! Frames are classified once, at the frame boundary, into the tagged
//! [`Event`] union. Everything downstream matches on the variant instead of
//! probing JSON keys.
//!
//! # Frame shapes
//!
//! ```text
//! {"type":"hello","ok":true}                                   → Hello
//! {"event":"command","command":"calc","args":[..],"user":{..}} → Command
//! {"event":"join","user":{"name":..,"uuid":..}}                → Join
//! {"event":"leave","user":{"name":..,"uuid":..}}               → Leave
//! {"type":"players","players":[{"name":..,"uuid":..}, ..]}     → RosterSnapshot
//! {"error":"..."}                                              → ProtocolError
//! anything else                                                → unrecognised
//! ```

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::foundation::identity::Identity;

/// A command typed by a remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Command name without prefix.
    pub name: String,
    /// Whitespace-split arguments as sent by the server.
    pub args: Vec<String>,
    /// Who typed the command.
    pub invoker: Identity,
}

impl CommandInvocation {
    /// Creates a new invocation.
    pub fn new(name: impl Into<String>, args: Vec<String>, invoker: Identity) -> Self {
        Self {
            name: name.into(),
            args,
            invoker,
        }
    }

    /// Arguments joined with single spaces.
    pub fn args_text(&self) -> String {
        self.args.join(" ")
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Handshake result.
    Hello {
        /// Whether the server accepted the session.
        ok: bool,
    },
    /// A command invocation.
    Command(CommandInvocation),
    /// A participant joined.
    Join(Identity),
    /// A participant left.
    Leave(Identity),
    /// Full list of present participants.
    RosterSnapshot(Vec<Identity>),
    /// The server reported an error.
    ProtocolError {
        /// Error text from the server.
        message: String,
    },
}

#[derive(Deserialize)]
struct HelloFrame {
    ok: bool,
}

#[derive(Deserialize)]
struct CommandFrame {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    user: Identity,
}

#[derive(Deserialize)]
struct MembershipFrame {
    user: Identity,
}

#[derive(Deserialize)]
struct PlayersFrame {
    players: Vec<Identity>,
}

impl Event {
    /// Decodes one text frame.
    ///
    /// Returns `Ok(None)` for well-formed JSON objects of an unrecognised
    /// shape; callers log and skip those.
    pub fn decode(raw: &str) -> Result<Option<Self>, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(object) = value else {
            return Err(DecodeError::NotAnObject);
        };
        Self::from_object(object)
    }

    fn from_object(object: Map<String, Value>) -> Result<Option<Self>, DecodeError> {
        let frame_type = object.get("type").and_then(Value::as_str);
        let event = object.get("event").and_then(Value::as_str);

        if frame_type == Some("hello") {
            let frame: HelloFrame = shape(object, "hello")?;
            return Ok(Some(Self::Hello { ok: frame.ok }));
        }

        match event {
            Some("command") => {
                let frame: CommandFrame = shape(object, "command")?;
                return Ok(Some(Self::Command(CommandInvocation {
                    name: frame.command,
                    args: frame.args,
                    invoker: frame.user,
                })));
            }
            Some("join") => {
                let frame: MembershipFrame = shape(object, "join")?;
                return Ok(Some(Self::Join(frame.user)));
            }
            Some("leave") => {
                let frame: MembershipFrame = shape(object, "leave")?;
                return Ok(Some(Self::Leave(frame.user)));
            }
            _ => {}
        }

        if frame_type == Some("players") {
            let frame: PlayersFrame = shape(object, "players")?;
            return Ok(Some(Self::RosterSnapshot(frame.players)));
        }

        if let Some(error) = object.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(Some(Self::ProtocolError { message }));
        }

        Ok(None)
    }

    /// Short name for logs.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Command(_) => "command",
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::RosterSnapshot(_) => "players",
            Self::ProtocolError { .. } => "error",
        }
    }
}

fn shape<T: DeserializeOwned>(
    object: Map<String, Value>,
    name: &'static str,
) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(object))
        .map_err(|e| DecodeError::malformed(name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hello() {
        assert_eq!(
            Event::decode(r#"{"type":"hello","ok":true,"guest":false}"#).unwrap(),
            Some(Event::Hello { ok: true })
        );
        assert_eq!(
            Event::decode(r#"{"type":"hello","ok":false}"#).unwrap(),
            Some(Event::Hello { ok: false })
        );
    }

    #[test]
    fn test_decode_command() {
        let raw = r#"{"type":"event","event":"command","command":"calc",
            "args":["1","+","2"],"user":{"name":"alice","uuid":"a-1","rank":"member"}}"#;
        let Some(Event::Command(cmd)) = Event::decode(raw).unwrap() else {
            panic!("expected a command");
        };
        assert_eq!(cmd.name, "calc");
        assert_eq!(cmd.args_text(), "1 + 2");
        assert_eq!(cmd.invoker, Identity::new("alice", "a-1"));
    }

    #[test]
    fn test_decode_command_without_args() {
        let raw = r#"{"event":"command","command":"ping","user":{"name":"a","uuid":"1"}}"#;
        let Some(Event::Command(cmd)) = Event::decode(raw).unwrap() else {
            panic!("expected a command");
        };
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_decode_membership() {
        let join = r#"{"event":"join","user":{"name":"bob","uuid":"b"}}"#;
        let leave = r#"{"event":"leave","user":{"name":"bob","uuid":"b"}}"#;
        assert_eq!(
            Event::decode(join).unwrap(),
            Some(Event::Join(Identity::new("bob", "b")))
        );
        assert_eq!(
            Event::decode(leave).unwrap(),
            Some(Event::Leave(Identity::new("bob", "b")))
        );
    }

    #[test]
    fn test_decode_players() {
        let raw = r#"{"type":"players","players":[
            {"name":"a","uuid":"1"},{"name":"b","uuid":"2"}]}"#;
        let Some(Event::RosterSnapshot(players)) = Event::decode(raw).unwrap() else {
            panic!("expected a snapshot");
        };
        assert_eq!(players.len(), 2);
    }

    #[test]
    fn test_decode_error_frame() {
        assert_eq!(
            Event::decode(r#"{"ok":false,"error":"rate_limited"}"#).unwrap(),
            Some(Event::ProtocolError {
                message: "rate_limited".into()
            })
        );
    }

    #[test]
    fn test_unrecognised_shapes_are_skipped() {
        assert_eq!(
            Event::decode(r#"{"type":"event","event":"chat_ingame","text":"hi"}"#).unwrap(),
            None
        );
        assert_eq!(Event::decode(r#"{"type":"closing"}"#).unwrap(), None);
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(Event::decode("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(Event::decode("[1,2]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(
            Event::decode(r#"{"event":"join"}"#),
            Err(DecodeError::Malformed { shape: "join", .. })
        ));
    }
}
