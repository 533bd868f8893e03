//! Outbound frames.

use serde::{Deserialize, Serialize};

/// How the server should render the text of a `tell`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TellMode {
    /// `&`-code colour mini-language.
    #[default]
    Format,
    /// Markdown.
    Markdown,
}

/// A frame written by handlers and jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// A private message to one participant.
    Tell {
        /// Recipient display name.
        user: String,
        /// Sender label shown to the recipient.
        name: String,
        /// Message body.
        text: String,
        /// Rendering mode.
        mode: TellMode,
    },
}

impl OutboundFrame {
    /// Creates a `tell` frame in format mode.
    pub fn tell(user: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Tell {
            user: user.into(),
            name: name.into(),
            text: text.into(),
            mode: TellMode::Format,
        }
    }

    /// Switches the rendering mode.
    pub fn with_mode(self, mode: TellMode) -> Self {
        match self {
            Self::Tell {
                user, name, text, ..
            } => Self::Tell {
                user,
                name,
                text,
                mode,
            },
        }
    }

    /// Serialises the frame to its wire text.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
