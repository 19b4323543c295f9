use std::{future::pending, sync::Arc};

use futures::future::BoxFuture;
use shared::domain::{ConnectionState, Participant, PlaybackContext};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    catch_up::{CatchUpPlayer, CatchUpReport},
    connection::{session_url, SessionConnection},
    control::{ControlChannel, ControlOutcome},
    correlator::{AttributedClip, AudioCorrelator},
    error::{CatchUpError, SessionError, TransportError},
    history::{HistoryStore, MissingHistoryStore},
    playback::{AudioRenderer, PlaybackSequencer},
    roster::{ParticipantRoster, SharedRoster},
    transport::{Connector, LinkEvent, TransportLink},
    ClientEvent, SessionOptions,
};

const COMMAND_QUEUE_CAPACITY: usize = 64;

type ConnectFuture = BoxFuture<'static, Result<Box<dyn TransportLink>, TransportError>>;

pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub renderer: Arc<dyn AudioRenderer>,
    pub history: Arc<dyn HistoryStore>,
}

impl Collaborators {
    pub fn new(connector: Arc<dyn Connector>, renderer: Arc<dyn AudioRenderer>) -> Self {
        Self {
            connector,
            renderer,
            history: Arc::new(MissingHistoryStore),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub attempt: u32,
    pub username: Option<String>,
}

enum Command {
    Open { username: String, url: String },
    SendClip(Vec<u8>),
    Close,
    Shutdown,
}

pub struct Session;

impl Session {
    /// Spawns the control loop and the live playback worker.
    ///
    /// Both stop once every handle is dropped or [`SessionHandle::shutdown`]
    /// is called.
    pub fn start(options: SessionOptions, collaborators: Collaborators) -> SessionHandle {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let roster = ParticipantRoster::shared();
        let sequencer = Arc::new(PlaybackSequencer::new(
            collaborators.renderer,
            Arc::clone(&roster),
            events.clone(),
            options.slot_policy,
        ));
        let catch_up = CatchUpPlayer::new(
            Arc::clone(&sequencer),
            Arc::clone(&roster),
            collaborators.history,
            events.clone(),
            options.pacing_gap,
        );

        let (live_tx, live_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_live_playback(sequencer, live_rx));

        let connection = SessionConnection::new(options.backoff);
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: connection.state(),
            attempt: connection.attempt(),
            username: None,
        });
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let control_loop = SessionLoop {
            connection,
            control: ControlChannel::new(),
            correlator: AudioCorrelator::new(),
            roster: Arc::clone(&roster),
            connector: collaborators.connector,
            events: events.clone(),
            status: status_tx,
            live_clips: live_tx,
            url: None,
            link: None,
            connecting: None,
            reconnect_at: None,
        };
        tokio::spawn(control_loop.run(command_rx));

        SessionHandle {
            server_url: options.server_url,
            commands,
            roster,
            events,
            status: status_rx,
            catch_up,
        }
    }
}

/// Cheap to clone; every clone drives the same session.
#[derive(Clone)]
pub struct SessionHandle {
    server_url: String,
    commands: mpsc::Sender<Command>,
    roster: SharedRoster,
    events: broadcast::Sender<ClientEvent>,
    status: watch::Receiver<SessionStatus>,
    catch_up: CatchUpPlayer,
}

impl SessionHandle {
    pub async fn open(&self, username: &str) -> Result<(), SessionError> {
        let url = session_url(&self.server_url, username)?;
        self.send(Command::Open {
            username: username.to_string(),
            url,
        })
        .await
    }

    /// Sends one recorded clip as a single binary frame.
    pub async fn send_clip(&self, clip: Vec<u8>) -> Result<(), SessionError> {
        self.send(Command::SendClip(clip)).await
    }

    /// Tears the connection down without scheduling a reconnect.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.send(Command::Close).await
    }

    /// Closes the connection, stops catch-up and ends the control loop.
    pub async fn shutdown(&self) {
        self.catch_up.close().await;
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub async fn participants(&self) -> Vec<Participant> {
        self.roster.lock().await.participants()
    }

    pub async fn is_muted(&self, username: &str) -> bool {
        self.roster.lock().await.is_muted(username)
    }

    pub async fn set_muted(&self, username: &str, muted: bool) {
        self.roster.lock().await.set_muted(username, muted);
        self.emit_mute(username, muted);
    }

    pub async fn toggle_muted(&self, username: &str) -> bool {
        let muted = self.roster.lock().await.toggle_muted(username);
        self.emit_mute(username, muted);
        muted
    }

    fn emit_mute(&self, username: &str, muted: bool) {
        info!(username, muted, "mute changed");
        let _ = self.events.send(ClientEvent::MuteChanged {
            username: username.to_string(),
            muted,
        });
    }

    pub fn catch_up(&self) -> &CatchUpPlayer {
        &self.catch_up
    }

    /// Fetches recent history into a fresh catch-up queue.
    pub async fn open_catch_up(&self) -> Result<usize, CatchUpError> {
        self.catch_up.open().await
    }

    /// Runs catch-up playback in the background.
    pub fn start_catch_up(&self) -> JoinHandle<Option<CatchUpReport>> {
        let player = self.catch_up.clone();
        tokio::spawn(async move { player.start().await })
    }

    pub async fn stop_catch_up(&self) {
        self.catch_up.stop().await;
    }

    pub async fn close_catch_up(&self) {
        self.catch_up.close().await;
    }
}

async fn run_live_playback(
    sequencer: Arc<PlaybackSequencer>,
    mut clips: mpsc::UnboundedReceiver<AttributedClip>,
) {
    while let Some(AttributedClip { username, clip }) = clips.recv().await {
        sequencer
            .play(PlaybackContext::Live, &username, clip)
            .await;
    }
    debug!("live playback worker stopped");
}

struct SessionLoop {
    connection: SessionConnection,
    control: ControlChannel,
    correlator: AudioCorrelator,
    roster: SharedRoster,
    connector: Arc<dyn Connector>,
    events: broadcast::Sender<ClientEvent>,
    status: watch::Sender<SessionStatus>,
    live_clips: mpsc::UnboundedSender<AttributedClip>,
    url: Option<String>,
    link: Option<Box<dyn TransportLink>>,
    connecting: Option<ConnectFuture>,
    reconnect_at: Option<Instant>,
}

impl SessionLoop {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        self.close().await;
                        self.publish_status();
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                },
                result = finish_connect(&mut self.connecting) => self.handle_connected(result),
                event = next_link_event(&mut self.link) => self.handle_link_event(event).await,
                () = reconnect_timer(self.reconnect_at) => self.handle_reconnect_due(),
            }
            self.publish_status();
        }
        info!("session control loop stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { username, url } => {
                if self.link.is_some() || self.connecting.is_some() {
                    debug!("replacing existing connection");
                    self.close().await;
                }
                info!(username = %username, "opening session");
                self.connection.open(username);
                self.url = Some(url);
                self.start_connect();
            }
            Command::SendClip(clip) => self.send_clip(clip).await,
            Command::Close => {
                info!("closing session");
                self.close().await;
            }
            Command::Shutdown => {}
        }
    }

    fn start_connect(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };
        let connector = Arc::clone(&self.connector);
        self.connecting = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    fn handle_connected(&mut self, result: Result<Box<dyn TransportLink>, TransportError>) {
        match result {
            Ok(link) => {
                self.link = Some(link);
                self.connection.on_open();
            }
            Err(err) => {
                self.report(format!("{err}"));
                self.handle_closed();
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Text(raw) => {
                let mut roster = self.roster.lock().await;
                let outcome = self.control.handle(&raw, &mut roster, &mut self.correlator);
                let participants = match outcome {
                    Ok(ControlOutcome::RosterReplaced) => Some(roster.participants()),
                    Ok(_) => None,
                    Err(err) => {
                        drop(roster);
                        self.report(format!("dropped control message: {err}"));
                        return;
                    }
                };
                if let Some(participants) = participants {
                    let _ = self.events.send(ClientEvent::RosterUpdated(participants));
                }
            }
            LinkEvent::Binary(clip) => {
                if let Some(attributed) = self.correlator.on_binary_frame(clip) {
                    debug!(username = %attributed.username, bytes = attributed.clip.len(), "clip attributed");
                    let _ = self.live_clips.send(attributed);
                }
            }
            LinkEvent::Closed { error } => {
                if let Some(err) = error {
                    self.report(format!("{err}"));
                }
                info!("session connection closed by transport");
                self.handle_closed();
            }
        }
    }

    fn handle_closed(&mut self) {
        self.link = None;
        self.connecting = None;
        self.correlator.reset();
        if let Some(plan) = self.connection.on_closed() {
            self.reconnect_at = Some(Instant::now() + plan.delay);
            let _ = self.events.send(ClientEvent::ReconnectScheduled {
                attempt: plan.attempt,
                delay: plan.delay,
            });
        }
    }

    fn handle_reconnect_due(&mut self) {
        self.reconnect_at = None;
        if let Some(username) = self.connection.on_reconnect_due() {
            info!(username = %username, attempt = self.connection.attempt(), "reconnecting");
            self.start_connect();
        }
    }

    async fn send_clip(&mut self, clip: Vec<u8>) {
        if clip.is_empty() {
            debug!("not sending empty clip");
            return;
        }
        let Some(link) = self.link.as_mut() else {
            warn!(bytes = clip.len(), "dropping outbound clip; connection is not open");
            return;
        };
        let bytes = clip.len();
        match link.send_clip(clip).await {
            Ok(()) => debug!(bytes, "sent clip"),
            Err(err) => {
                self.report(format!("{err}"));
                self.handle_closed();
            }
        }
    }

    async fn close(&mut self) {
        self.connection.close();
        self.connecting = None;
        self.reconnect_at = None;
        self.correlator.reset();
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }

    fn report(&self, message: String) {
        warn!(error = %message, "session error");
        let _ = self.events.send(ClientEvent::Error(message));
    }

    fn publish_status(&self) {
        let next = SessionStatus {
            state: self.connection.state(),
            attempt: self.connection.attempt(),
            username: self.connection.username().map(str::to_string),
        };
        let previous = self.status.borrow().state;
        if *self.status.borrow() == next {
            return;
        }
        self.status.send_replace(next.clone());
        if previous != next.state {
            let _ = self.events.send(ClientEvent::ConnectionStateChanged {
                state: next.state,
                attempt: next.attempt,
            });
        }
    }
}

async fn finish_connect(
    connecting: &mut Option<ConnectFuture>,
) -> Result<Box<dyn TransportLink>, TransportError> {
    let Some(future) = connecting.as_mut() else {
        return pending().await;
    };
    let result = future.await;
    *connecting = None;
    result
}

async fn next_link_event(link: &mut Option<Box<dyn TransportLink>>) -> LinkEvent {
    match link.as_mut() {
        Some(link) => link.recv().await,
        None => pending().await,
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
