use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use client_core::{error::CaptureError, AudioCapture};
use tokio::{process::Child, sync::Mutex};
use tracing::debug;

use crate::command::build_command;

struct Recording {
    child: Child,
    path: PathBuf,
}

/// Records through an external command that writes to `{file}` until killed.
pub struct CommandCapture {
    template: String,
    dir: PathBuf,
    extension: String,
    active: Mutex<Option<Recording>>,
}

impl CommandCapture {
    pub fn new(template: impl Into<String>, dir: PathBuf, extension: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            dir,
            extension: extension.into(),
            active: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AudioCapture for CommandCapture {
    async fn start_capture(&self) -> Result<(), CaptureError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(CaptureError::Failed("already recording".into()));
        }
        let path = self.dir.join(format!(
            "holler-capture-{}.{}",
            std::process::id(),
            self.extension
        ));
        let child = build_command(&self.template, &path)
            .ok_or_else(|| CaptureError::Unavailable("recorder command is empty".into()))?
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|err| CaptureError::Unavailable(format!("failed to start recorder: {err}")))?;
        *active = Some(Recording { child, path });
        Ok(())
    }

    async fn stop_capture(&self) -> Result<Vec<u8>, CaptureError> {
        let Some(Recording { mut child, path }) = self.active.lock().await.take() else {
            return Err(CaptureError::Failed("not recording".into()));
        };
        let exited = matches!(child.try_wait(), Ok(Some(_)));
        if !exited {
            if let Err(err) = child.start_kill() {
                debug!(error = %err, "recorder already gone");
            }
        }
        match child.wait().await {
            Ok(status) => debug!(%status, "recorder exited"),
            Err(err) => debug!(error = %err, "failed to reap recorder"),
        }

        let clip = tokio::fs::read(&path)
            .await
            .map_err(|err| CaptureError::Failed(format!("{}: {err}", path.display())));
        if let Err(err) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %err, "failed to remove capture file");
        }
        clip
    }
}

#[cfg(test)]
#[path = "tests/capture_tests.rs"]
mod tests;
