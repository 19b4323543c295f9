use shared::{error::ProtocolError, protocol::ControlMessage};
use tracing::debug;

use crate::{correlator::AudioCorrelator, roster::ParticipantRoster};

/// What a text frame did to engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    RosterReplaced,
    SpeakerPending(String),
    Ignored,
}

/// Applies decoded control messages to the roster and the correlator.
#[derive(Debug, Default)]
pub struct ControlChannel;

impl ControlChannel {
    pub fn new() -> Self {
        Self
    }

    /// Errors leave all state untouched; the caller reports and moves on.
    pub fn handle(
        &self,
        raw: &str,
        roster: &mut ParticipantRoster,
        correlator: &mut AudioCorrelator,
    ) -> Result<ControlOutcome, ProtocolError> {
        let Some(message) = ControlMessage::decode(raw)? else {
            debug!("ignoring control message with unrecognized type");
            return Ok(ControlOutcome::Ignored);
        };

        match message {
            ControlMessage::Participants { participants } => {
                debug!(count = participants.len(), "replacing roster");
                roster.replace(participants);
                Ok(ControlOutcome::RosterReplaced)
            }
            ControlMessage::Speaker { username } => {
                correlator.announce(username.clone());
                Ok(ControlOutcome::SpeakerPending(username))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/control_tests.rs"]
mod tests;
