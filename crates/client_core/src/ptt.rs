//! Press-hold-release recording glue for outbound clips.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::{CaptureError, PushToTalkError},
    session::SessionHandle,
};

#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn start_capture(&self) -> Result<(), CaptureError>;
    /// Ends the recording started by `start_capture` and returns the clip.
    async fn stop_capture(&self) -> Result<Vec<u8>, CaptureError>;
}

pub struct MissingAudioCapture;

#[async_trait]
impl AudioCapture for MissingAudioCapture {
    async fn start_capture(&self) -> Result<(), CaptureError> {
        Err(CaptureError::Unavailable("no capture device configured".into()))
    }

    async fn stop_capture(&self) -> Result<Vec<u8>, CaptureError> {
        Err(CaptureError::Unavailable("no capture device configured".into()))
    }
}

pub struct PushToTalk {
    capture: Arc<dyn AudioCapture>,
    session: SessionHandle,
    recording: Mutex<bool>,
}

impl PushToTalk {
    pub fn new(capture: Arc<dyn AudioCapture>, session: SessionHandle) -> Self {
        Self {
            capture,
            session,
            recording: Mutex::new(false),
        }
    }

    pub async fn is_recording(&self) -> bool {
        *self.recording.lock().await
    }

    /// Starts recording. A press while already recording is ignored.
    pub async fn press(&self) -> Result<(), PushToTalkError> {
        let mut recording = self.recording.lock().await;
        if *recording {
            debug!("push-to-talk already recording");
            return Ok(());
        }
        self.capture.start_capture().await?;
        *recording = true;
        Ok(())
    }

    /// Stops recording and sends the clip. Returns the number of bytes handed
    /// to the session, zero when nothing was recorded.
    pub async fn release(&self) -> Result<usize, PushToTalkError> {
        let mut recording = self.recording.lock().await;
        if !*recording {
            debug!("push-to-talk release without press");
            return Ok(0);
        }
        *recording = false;
        let clip = self.capture.stop_capture().await?;
        drop(recording);

        if clip.is_empty() {
            warn!("push-to-talk produced an empty clip");
            return Ok(0);
        }
        let bytes = clip.len();
        self.session.send_clip(clip).await?;
        Ok(bytes)
    }
}

#[cfg(test)]
#[path = "tests/ptt_tests.rs"]
mod tests;
