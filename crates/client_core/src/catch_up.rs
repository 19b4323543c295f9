//! Ordered, cooperatively cancellable replay of recent clips.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{domain::PlaybackContext, protocol::HistoryEntry};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::CatchUpError,
    history::HistoryStore,
    playback::{PlaybackOutcome, PlaybackSequencer},
    roster::SharedRoster,
    ClientEvent,
};

pub const DEFAULT_PACING_GAP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUpState {
    Idle,
    Playing,
    /// Stop requested; the clip in flight is still finishing.
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    pub played: usize,
    pub failed: usize,
    pub skipped_muted: usize,
    pub cancelled: bool,
}

struct QueueState {
    entries: Vec<HistoryEntry>,
    cursor: usize,
    state: CatchUpState,
}

/// Cloneable handle; clones share one queue.
#[derive(Clone)]
pub struct CatchUpPlayer {
    sequencer: Arc<PlaybackSequencer>,
    roster: SharedRoster,
    history: Arc<dyn HistoryStore>,
    events: broadcast::Sender<ClientEvent>,
    pacing_gap: Duration,
    active: Arc<AtomicBool>,
    queue: Arc<Mutex<QueueState>>,
}

impl CatchUpPlayer {
    pub fn new(
        sequencer: Arc<PlaybackSequencer>,
        roster: SharedRoster,
        history: Arc<dyn HistoryStore>,
        events: broadcast::Sender<ClientEvent>,
        pacing_gap: Duration,
    ) -> Self {
        Self {
            sequencer,
            roster,
            history,
            events,
            pacing_gap,
            active: Arc::new(AtomicBool::new(false)),
            queue: Arc::new(Mutex::new(QueueState {
                entries: Vec::new(),
                cursor: 0,
                state: CatchUpState::Idle,
            })),
        }
    }

    /// Loads a most-recent-first history snapshot for oldest-first replay.
    ///
    /// Returns false, leaving the queue alone, unless the player is idle.
    pub async fn load(&self, mut entries: Vec<HistoryEntry>) -> bool {
        let mut queue = self.queue.lock().await;
        if queue.state != CatchUpState::Idle {
            warn!(state = ?queue.state, "refusing to reload catch-up queue while playing");
            return false;
        }
        entries.reverse();
        debug!(count = entries.len(), "loaded catch-up queue");
        queue.entries = entries;
        queue.cursor = 0;
        true
    }

    /// Fetches the recent history and loads it.
    ///
    /// Fails with [`CatchUpError::Busy`] unless the player is idle, so a
    /// stopped run must wind down before the queue is rebuilt.
    pub async fn open(&self) -> Result<usize, CatchUpError> {
        let state = self.state().await;
        if state != CatchUpState::Idle {
            return Err(CatchUpError::Busy(state));
        }
        let entries = self.history.fetch_recent().await?;
        let count = entries.len();
        if !self.load(entries).await {
            return Err(CatchUpError::Busy(self.state().await));
        }
        Ok(count)
    }

    /// Stops playback and discards the queue.
    pub async fn close(&self) {
        self.stop().await;
        let mut queue = self.queue.lock().await;
        queue.entries.clear();
        queue.cursor = 0;
    }

    pub async fn state(&self) -> CatchUpState {
        self.queue.lock().await.state
    }

    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.queue.lock().await.entries.clone()
    }

    /// Index of the next entry the loop will look at.
    pub async fn position(&self) -> usize {
        self.queue.lock().await.cursor
    }

    /// Requests cancellation; observed before the next entry starts.
    pub async fn stop(&self) {
        let mut queue = self.queue.lock().await;
        self.active.store(false, Ordering::SeqCst);
        if queue.state == CatchUpState::Playing {
            queue.state = CatchUpState::Stopped;
            drop(queue);
            info!("catch-up stop requested");
            self.emit_state(CatchUpState::Stopped);
        }
    }

    /// Plays the queue from the beginning and resolves when the loop exits.
    ///
    /// Returns `None` without doing anything unless the player is idle.
    pub async fn start(&self) -> Option<CatchUpReport> {
        {
            let mut queue = self.queue.lock().await;
            if queue.state != CatchUpState::Idle {
                debug!(state = ?queue.state, "catch-up already running");
                return None;
            }
            queue.state = CatchUpState::Playing;
            queue.cursor = 0;
            self.active.store(true, Ordering::SeqCst);
        }
        self.emit_state(CatchUpState::Playing);

        let report = self.run().await;

        {
            let mut queue = self.queue.lock().await;
            self.active.store(false, Ordering::SeqCst);
            queue.state = CatchUpState::Idle;
        }
        info!(
            played = report.played,
            failed = report.failed,
            skipped_muted = report.skipped_muted,
            cancelled = report.cancelled,
            "catch-up finished"
        );
        self.emit_state(CatchUpState::Idle);
        Some(report)
    }

    async fn run(&self) -> CatchUpReport {
        let mut report = CatchUpReport::default();
        let mut attempted_any = false;
        loop {
            let entry = {
                let mut queue = self.queue.lock().await;
                let Some(entry) = queue.entries.get(queue.cursor).cloned() else {
                    break;
                };
                if !self.active.load(Ordering::SeqCst) {
                    report.cancelled = true;
                    break;
                }
                queue.cursor += 1;
                entry
            };

            if self.roster.lock().await.is_muted(&entry.username) {
                debug!(id = %entry.id, username = %entry.username, "skipping muted catch-up clip");
                report.skipped_muted += 1;
                continue;
            }

            if attempted_any {
                tokio::time::sleep(self.pacing_gap).await;
                if !self.active.load(Ordering::SeqCst) {
                    report.cancelled = true;
                    break;
                }
            }
            attempted_any = true;

            match self.history.fetch_clip(entry.id).await {
                Ok(clip) => {
                    let outcome = self
                        .sequencer
                        .play(PlaybackContext::CatchUp, &entry.username, clip)
                        .await;
                    match outcome {
                        PlaybackOutcome::Completed => report.played += 1,
                        PlaybackOutcome::Failed(_) => report.failed += 1,
                    }
                }
                Err(err) => {
                    warn!(id = %entry.id, error = %err, "failed to fetch catch-up clip");
                    let _ = self.events.send(ClientEvent::Error(format!(
                        "failed to fetch clip {}: {err}",
                        entry.id
                    )));
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn emit_state(&self, state: CatchUpState) {
        let _ = self.events.send(ClientEvent::CatchUpStateChanged(state));
    }
}

#[cfg(test)]
#[path = "tests/catch_up_tests.rs"]
mod tests;
