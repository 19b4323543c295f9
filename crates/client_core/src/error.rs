use shared::domain::MessageId;
use thiserror::Error;

use crate::catch_up::CatchUpState;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to connect websocket {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("websocket receive failed: {0}")]
    Receive(String),
    #[error("websocket send failed: {0}")]
    Send(String),
    #[error("server_url must start with http:// or https://, got {0}")]
    InvalidServerUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("failed to prepare clip for playback: {0}")]
    Prepare(String),
    #[error("audio rendering failed: {0}")]
    Render(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("history store returned status {status} for {path}")]
    Status { status: u16, path: String },
    #[error("clip {0} not found in history store")]
    MissingClip(MessageId),
    #[error("history store is unavailable")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum CatchUpError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("catch-up queue is busy ({0:?}); wait for it to return to idle")]
    Busy(CatchUpState),
}

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("audio capture unavailable: {0}")]
    Unavailable(String),
    #[error("audio capture failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session control loop has stopped")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum PushToTalkError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
