//! Recording fakes for engine collaborators.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{domain::MessageId, protocol::HistoryEntry};
use tokio::sync::{broadcast, mpsc, Mutex, Notify};

use crate::{
    error::{CaptureError, HistoryError, PlaybackError, TransportError},
    history::HistoryStore,
    playback::{AudioRenderer, ClipHandle},
    ptt::AudioCapture,
    transport::{Connector, LinkEvent, TransportLink},
    ClientEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    Acquire(Vec<u8>),
    Render(Vec<u8>),
    Release(Vec<u8>),
}

#[derive(Default)]
pub struct FakeRenderer {
    next_handle: AtomicU64,
    clips: std::sync::Mutex<HashMap<ClipHandle, Vec<u8>>>,
    calls: std::sync::Mutex<Vec<RenderCall>>,
    render_delay: Duration,
    fail_render: Option<String>,
    fail_acquire: Option<String>,
    pub render_started: Notify,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn failing_render(mut self, reason: &str) -> Self {
        self.fail_render = Some(reason.to_string());
        self
    }

    pub fn failing_acquire(mut self, reason: &str) -> Self {
        self.fail_acquire = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn rendered(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RenderCall::Render(clip) => Some(clip),
                _ => None,
            })
            .collect()
    }

    pub fn release_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RenderCall::Release(_)))
            .count()
    }

    pub fn outstanding(&self) -> usize {
        self.clips.lock().expect("clips").len()
    }

    fn record(&self, call: RenderCall) {
        self.calls.lock().expect("calls").push(call);
    }

    fn clip(&self, handle: ClipHandle) -> Vec<u8> {
        self.clips
            .lock()
            .expect("clips")
            .get(&handle)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AudioRenderer for FakeRenderer {
    async fn acquire(&self, clip: &[u8]) -> Result<ClipHandle, PlaybackError> {
        self.record(RenderCall::Acquire(clip.to_vec()));
        if let Some(reason) = &self.fail_acquire {
            return Err(PlaybackError::Prepare(reason.clone()));
        }
        let handle = ClipHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.clips
            .lock()
            .expect("clips")
            .insert(handle, clip.to_vec());
        Ok(handle)
    }

    async fn render(&self, handle: ClipHandle) -> Result<(), PlaybackError> {
        self.record(RenderCall::Render(self.clip(handle)));
        self.render_started.notify_one();
        if !self.render_delay.is_zero() {
            tokio::time::sleep(self.render_delay).await;
        }
        match &self.fail_render {
            Some(reason) => Err(PlaybackError::Render(reason.clone())),
            None => Ok(()),
        }
    }

    fn release(&self, handle: ClipHandle) {
        let clip = self
            .clips
            .lock()
            .expect("clips")
            .remove(&handle)
            .unwrap_or_default();
        self.record(RenderCall::Release(clip));
    }
}

#[derive(Default)]
pub struct FakeHistory {
    pub recent: Vec<HistoryEntry>,
    pub clips: HashMap<MessageId, Vec<u8>>,
    pub fetched: std::sync::Mutex<Vec<MessageId>>,
}

impl FakeHistory {
    pub fn with_clips(entries: &[(i64, &str)]) -> Self {
        let mut history = Self::default();
        for (id, username) in entries {
            history.recent.push(entry(*id, username));
            history
                .clips
                .insert(MessageId(*id), format!("clip-{id}").into_bytes());
        }
        history
    }

    pub fn fetched(&self) -> Vec<MessageId> {
        self.fetched.lock().expect("fetched").clone()
    }
}

#[async_trait]
impl HistoryStore for FakeHistory {
    async fn fetch_recent(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self.recent.clone())
    }

    async fn fetch_clip(&self, id: MessageId) -> Result<Vec<u8>, HistoryError> {
        self.fetched.lock().expect("fetched").push(id);
        self.clips
            .get(&id)
            .cloned()
            .ok_or(HistoryError::MissingClip(id))
    }
}

pub fn entry(id: i64, username: &str) -> HistoryEntry {
    HistoryEntry {
        id: MessageId(id),
        username: username.to_string(),
        timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap_or_default(),
    }
}

pub fn drain_events(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Server side of an in-memory link.
pub struct FakePeer {
    pub inbound: mpsc::UnboundedSender<LinkEvent>,
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakePeer {
    pub fn text(&self, raw: &str) {
        let _ = self.inbound.send(LinkEvent::Text(raw.to_string()));
    }

    pub fn binary(&self, clip: &[u8]) {
        let _ = self.inbound.send(LinkEvent::Binary(clip.to_vec()));
    }

    pub fn close(&self) {
        let _ = self.inbound.send(LinkEvent::Closed { error: None });
    }
}

pub struct FakeLink {
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_send: bool,
}

#[async_trait]
impl TransportLink for FakeLink {
    async fn recv(&mut self) -> LinkEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(LinkEvent::Closed { error: None })
    }

    async fn send_clip(&mut self, clip: Vec<u8>) -> Result<(), TransportError> {
        if self.fail_send {
            return Err(TransportError::Send("peer went away".into()));
        }
        self.sent.lock().await.push(clip);
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Hands out scripted connect results and keeps the peer ends.
#[derive(Default)]
pub struct FakeConnector {
    pub urls: std::sync::Mutex<Vec<String>>,
    script: std::sync::Mutex<VecDeque<bool>>,
    peers: Mutex<VecDeque<FakePeer>>,
    fail_send: bool,
    peer_ready: Notify,
}

impl FakeConnector {
    /// `true` entries succeed, `false` entries fail; an exhausted script succeeds.
    pub fn scripted(script: &[bool]) -> Self {
        Self {
            script: std::sync::Mutex::new(script.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn failing_sends() -> Self {
        Self {
            fail_send: true,
            ..Self::default()
        }
    }

    pub fn connect_count(&self) -> usize {
        self.urls.lock().expect("urls").len()
    }

    pub async fn next_peer(&self) -> FakePeer {
        loop {
            let notified = self.peer_ready.notified();
            if let Some(peer) = self.peers.lock().await.pop_front() {
                return peer;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        self.urls.lock().expect("urls").push(url.to_string());
        let succeed = self
            .script
            .lock()
            .expect("script")
            .pop_front()
            .unwrap_or(true);
        if !succeed {
            return Err(TransportError::Connect {
                url: url.to_string(),
                reason: "connection refused".into(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.peers.lock().await.push_back(FakePeer {
            inbound: tx,
            sent: Arc::clone(&sent),
        });
        self.peer_ready.notify_one();
        Ok(Box::new(FakeLink {
            inbound: rx,
            sent,
            fail_send: self.fail_send,
        }))
    }
}

#[derive(Default)]
pub struct FakeCapture {
    pub clip: Vec<u8>,
    pub starts: AtomicU64,
    pub stops: AtomicU64,
    pub fail_start: bool,
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn start_capture(&self) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::Unavailable("no microphone".into()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_capture(&self) -> Result<Vec<u8>, CaptureError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(self.clip.clone())
    }
}
