//! Binds a speaker announcement to the next binary frame.
//!
//! The relay protocol carries no frame ids: the server sends a `speaker`
//! text frame immediately before the clip it describes. A single pending
//! slot is all the correlation there is. Two announces before a frame
//! resolve last-writer-wins; a frame with no announce is dropped.

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedClip {
    pub username: String,
    pub clip: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct AudioCorrelator {
    pending: Option<String>,
    dropped_frames: u64,
}

impl AudioCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn announce(&mut self, username: impl Into<String>) {
        let username = username.into();
        if let Some(previous) = self.pending.replace(username.clone()) {
            debug!(
                superseded = %previous,
                username = %username,
                "speaker announce superseded an unconsumed announce"
            );
        }
    }

    pub fn on_binary_frame(&mut self, clip: Vec<u8>) -> Option<AttributedClip> {
        match self.pending.take() {
            Some(username) => Some(AttributedClip { username, clip }),
            None => {
                self.dropped_frames += 1;
                debug!(bytes = clip.len(), "dropping audio frame with no pending speaker");
                None
            }
        }
    }

    pub fn pending_speaker(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Frames discarded because no speaker was pending.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
#[path = "tests/correlator_tests.rs"]
mod tests;
