//! Single-flight clip playback gated by the roster's mute flags.

use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::PlaybackContext;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::{error::PlaybackError, roster::SharedRoster, ClientEvent};

/// Opaque handle to a renderer-side resource holding one decoded clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipHandle(pub u64);

/// Turns clips into sound. Implemented outside the engine.
#[async_trait]
pub trait AudioRenderer: Send + Sync {
    /// Allocates whatever the renderer needs to play `clip`.
    async fn acquire(&self, clip: &[u8]) -> Result<ClipHandle, PlaybackError>;
    /// Resolves when playback of `handle` has ended.
    async fn render(&self, handle: ClipHandle) -> Result<(), PlaybackError>;
    fn release(&self, handle: ClipHandle);
}

pub struct MissingAudioRenderer;

#[async_trait]
impl AudioRenderer for MissingAudioRenderer {
    async fn acquire(&self, _clip: &[u8]) -> Result<ClipHandle, PlaybackError> {
        Err(PlaybackError::Prepare("audio renderer is unavailable".into()))
    }

    async fn render(&self, _handle: ClipHandle) -> Result<(), PlaybackError> {
        Err(PlaybackError::Render("audio renderer is unavailable".into()))
    }

    fn release(&self, _handle: ClipHandle) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed(PlaybackError),
}

impl PlaybackOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// How playback contexts map onto playback slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPolicy {
    /// Live and catch-up clips may overlap.
    #[default]
    PerContext,
    /// One clip at a time across both contexts.
    Shared,
}

struct ReleaseOnDrop<'a> {
    renderer: &'a dyn AudioRenderer,
    handle: ClipHandle,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.renderer.release(self.handle);
    }
}

pub struct PlaybackSequencer {
    renderer: Arc<dyn AudioRenderer>,
    roster: SharedRoster,
    events: broadcast::Sender<ClientEvent>,
    live_slot: Arc<Mutex<()>>,
    catch_up_slot: Arc<Mutex<()>>,
}

impl PlaybackSequencer {
    pub fn new(
        renderer: Arc<dyn AudioRenderer>,
        roster: SharedRoster,
        events: broadcast::Sender<ClientEvent>,
        policy: SlotPolicy,
    ) -> Self {
        let live_slot = Arc::new(Mutex::new(()));
        let catch_up_slot = match policy {
            SlotPolicy::PerContext => Arc::new(Mutex::new(())),
            SlotPolicy::Shared => Arc::clone(&live_slot),
        };
        Self {
            renderer,
            roster,
            events,
            live_slot,
            catch_up_slot,
        }
    }

    fn slot(&self, context: PlaybackContext) -> &Mutex<()> {
        match context {
            PlaybackContext::Live => &self.live_slot,
            PlaybackContext::CatchUp => &self.catch_up_slot,
        }
    }

    /// Plays one clip, returning once the renderer is done with it.
    ///
    /// Muted speakers complete immediately without touching the renderer.
    /// A second call in the same context waits for the slot.
    pub async fn play(
        &self,
        context: PlaybackContext,
        username: &str,
        clip: Vec<u8>,
    ) -> PlaybackOutcome {
        if self.roster.lock().await.is_muted(username) {
            debug!(username, ?context, "skipping clip from muted speaker");
            return PlaybackOutcome::Completed;
        }

        let _slot = self.slot(context).lock().await;

        let outcome = match self.renderer.acquire(&clip).await {
            Ok(handle) => {
                let _release = ReleaseOnDrop {
                    renderer: self.renderer.as_ref(),
                    handle,
                };
                self.mark_speaking(username, true).await;
                let result = self.renderer.render(handle).await;
                self.mark_speaking(username, false).await;
                result
            }
            Err(err) => Err(err),
        };

        let outcome = match outcome {
            Ok(()) => PlaybackOutcome::Completed,
            Err(err) => {
                warn!(username, ?context, error = %err, "clip playback failed");
                PlaybackOutcome::Failed(err)
            }
        };
        let _ = self.events.send(ClientEvent::PlaybackFinished {
            context,
            username: username.to_string(),
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn mark_speaking(&self, username: &str, speaking: bool) {
        let changed = self.roster.lock().await.set_speaking(username, speaking);
        if changed {
            let _ = self.events.send(ClientEvent::SpeakingChanged {
                username: username.to_string(),
                speaking,
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/playback_tests.rs"]
mod tests;
