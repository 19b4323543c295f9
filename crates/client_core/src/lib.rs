//! Real-time session engine for the push-to-talk relay client.
//!
//! [`Session::start`] spawns one control task owning the connection, the
//! control channel and the audio correlator. Everything else talks to it
//! through a [`SessionHandle`].

use std::time::Duration;

use shared::domain::{ConnectionState, Participant, PlaybackContext};

pub mod catch_up;
pub mod connection;
pub mod control;
pub mod correlator;
pub mod error;
pub mod history;
pub mod playback;
pub mod ptt;
pub mod roster;
mod session;
pub mod transport;

pub use catch_up::{CatchUpPlayer, CatchUpReport, CatchUpState};
pub use connection::{Backoff, SessionConnection};
pub use history::{HistoryStore, HttpHistoryStore, MissingHistoryStore};
pub use playback::{AudioRenderer, ClipHandle, PlaybackOutcome, PlaybackSequencer, SlotPolicy};
pub use ptt::{AudioCapture, MissingAudioCapture, PushToTalk};
pub use roster::{ParticipantRoster, SharedRoster};
pub use session::{Collaborators, Session, SessionHandle, SessionStatus};
pub use transport::{Connector, WsConnector};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConnectionStateChanged {
        state: ConnectionState,
        attempt: u32,
    },
    ReconnectScheduled {
        attempt: u32,
        delay: Duration,
    },
    RosterUpdated(Vec<Participant>),
    SpeakingChanged {
        username: String,
        speaking: bool,
    },
    MuteChanged {
        username: String,
        muted: bool,
    },
    PlaybackFinished {
        context: PlaybackContext,
        username: String,
        outcome: PlaybackOutcome,
    },
    CatchUpStateChanged(CatchUpState),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// `http://` or `https://` base of the relay server.
    pub server_url: String,
    pub backoff: Backoff,
    pub pacing_gap: Duration,
    pub slot_policy: SlotPolicy,
    pub event_capacity: usize,
}

impl SessionOptions {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            backoff: Backoff::default(),
            pacing_gap: catch_up::DEFAULT_PACING_GAP,
            slot_policy: SlotPolicy::default(),
            event_capacity: 1024,
        }
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
