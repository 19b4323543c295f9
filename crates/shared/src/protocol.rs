use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{domain::MessageId, error::ProtocolError};

/// Text frames pushed by the relay server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Participants { participants: Vec<String> },
    Speaker { username: String },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireControlMessage {
    Participants {
        participants: Vec<String>,
    },
    Speaker {
        username: String,
    },
    #[serde(other)]
    Unrecognized,
}

impl ControlMessage {
    /// Decodes one text frame.
    ///
    /// Returns `Ok(None)` when the frame is well formed but carries a `type`
    /// this client does not know about; those frames are ignored.
    pub fn decode(raw: &str) -> Result<Option<Self>, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        let message = match serde_json::from_value::<WireControlMessage>(value)? {
            WireControlMessage::Participants { participants } => {
                Self::Participants { participants }
            }
            WireControlMessage::Speaker { username } => Self::Speaker { username },
            WireControlMessage::Unrecognized => return Ok(None),
        };
        Ok(Some(message))
    }
}

/// One recorded clip as listed by the history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: MessageId,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}
