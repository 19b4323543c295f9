use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
};

use async_trait::async_trait;
use client_core::{error::PlaybackError, AudioRenderer, ClipHandle};
use tracing::debug;

use crate::command::build_command;

/// Plays clips through an external player, one temp file per clip.
pub struct CommandRenderer {
    template: String,
    dir: PathBuf,
    extension: String,
    next_handle: AtomicU64,
    files: Mutex<HashMap<ClipHandle, PathBuf>>,
}

impl CommandRenderer {
    pub fn new(template: impl Into<String>, dir: PathBuf, extension: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            dir,
            extension: extension.into(),
            next_handle: AtomicU64::new(0),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn path(&self, handle: ClipHandle) -> Option<PathBuf> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }
}

#[async_trait]
impl AudioRenderer for CommandRenderer {
    async fn acquire(&self, clip: &[u8]) -> Result<ClipHandle, PlaybackError> {
        let handle = ClipHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let path = self.dir.join(format!(
            "holler-{}-{}.{}",
            std::process::id(),
            handle.0,
            self.extension
        ));
        tokio::fs::write(&path, clip)
            .await
            .map_err(|err| PlaybackError::Prepare(format!("{}: {err}", path.display())))?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, path);
        Ok(handle)
    }

    async fn render(&self, handle: ClipHandle) -> Result<(), PlaybackError> {
        let path = self
            .path(handle)
            .ok_or_else(|| PlaybackError::Render(format!("unknown clip handle {}", handle.0)))?;
        let mut command = build_command(&self.template, &path)
            .ok_or_else(|| PlaybackError::Render("player command is empty".into()))?;
        let status = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|err| PlaybackError::Render(format!("failed to run player: {err}")))?;
        if !status.success() {
            return Err(PlaybackError::Render(format!("player exited with {status}")));
        }
        Ok(())
    }

    fn release(&self, handle: ClipHandle) {
        let path = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        if let Some(path) = path {
            if let Err(err) = std::fs::remove_file(&path) {
                debug!(path = %path.display(), error = %err, "failed to remove clip file");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/player_tests.rs"]
mod tests;
