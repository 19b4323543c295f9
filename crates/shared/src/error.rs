use thiserror::Error;

/// A text frame that could not be turned into a control message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed control payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("control payload is not a JSON object")]
    NotAnObject,
}
