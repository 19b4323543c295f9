use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    ClientEvent, Collaborators, HttpHistoryStore, PlaybackOutcome, PushToTalk, Session,
    SessionHandle, WsConnector,
};
use shared::domain::ConnectionState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod capture;
mod command;
mod config;
mod player;
mod prompt;

use capture::CommandCapture;
use player::CommandRenderer;
use prompt::PromptCommand;

#[derive(Parser, Debug)]
#[command(about = "Push-to-talk voice relay client")]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    username: Option<String>,
    /// Settings file; `holler.toml` in the working directory is read when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Player command, `{file}` is replaced with the clip path.
    #[arg(long)]
    player: Option<String>,
    /// Recorder command, `{file}` is replaced with the output path.
    #[arg(long)]
    recorder: Option<String>,
    #[arg(long)]
    shared_playback_slot: bool,
    /// Replay recent history right after connecting.
    #[arg(long)]
    catch_up: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(username) = args.username {
        settings.username = Some(username);
    }
    if let Some(player) = args.player {
        settings.player_command = player;
    }
    if let Some(recorder) = args.recorder {
        settings.recorder_command = recorder;
    }
    settings.shared_playback_slot |= args.shared_playback_slot;
    let username = settings
        .username
        .clone()
        .context("a username is required (--username, config file or HOLLER_USERNAME)")?;

    let scratch = std::env::temp_dir();
    let renderer = Arc::new(CommandRenderer::new(
        settings.player_command.clone(),
        scratch.clone(),
        settings.clip_extension.clone(),
    ));
    let history = Arc::new(HttpHistoryStore::new(settings.server_url.clone()));
    let collaborators =
        Collaborators::new(Arc::new(WsConnector), renderer).with_history(history);
    let handle = Session::start(settings.session_options(), collaborators);

    tokio::spawn(print_events(handle.subscribe_events()));
    handle.open(&username).await?;
    tracing::info!(server_url = %settings.server_url, %username, "session started");

    if args.catch_up {
        start_catch_up(&handle).await;
    }

    let capture = Arc::new(CommandCapture::new(
        settings.recorder_command.clone(),
        scratch,
        settings.clip_extension.clone(),
    ));
    let ptt = PushToTalk::new(capture, handle.clone());
    run_prompt(&handle, &ptt).await?;

    handle.shutdown().await;
    Ok(())
}

async fn run_prompt(handle: &SessionHandle, ptt: &PushToTalk) -> Result<()> {
    println!("{}", prompt::USAGE);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match prompt::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}\n{}", prompt::USAGE);
                continue;
            }
        };
        match command {
            PromptCommand::Talk => match ptt.press().await {
                Ok(()) => println!("Recording... type 'over' to send"),
                Err(err) => println!("Cannot record: {err}"),
            },
            PromptCommand::Over => match ptt.release().await {
                Ok(0) => println!("Nothing recorded"),
                Ok(bytes) => println!("Sent {bytes} bytes"),
                Err(err) => println!("Send failed: {err}"),
            },
            PromptCommand::Send(path) => match tokio::fs::read(&path).await {
                Ok(clip) => {
                    let bytes = clip.len();
                    handle.send_clip(clip).await?;
                    println!("Sent {bytes} bytes from {}", path.display());
                }
                Err(err) => println!("Cannot read {}: {err}", path.display()),
            },
            PromptCommand::Mute(user) => handle.set_muted(&user, true).await,
            PromptCommand::Unmute(user) => handle.set_muted(&user, false).await,
            PromptCommand::Toggle(user) => {
                handle.toggle_muted(&user).await;
            }
            PromptCommand::Who => {
                let status = handle.status();
                println!(
                    "{} ({:?}, reconnect attempt {})",
                    status.username.as_deref().unwrap_or("-"),
                    status.state,
                    status.attempt
                );
                for participant in handle.participants().await {
                    let mut flags = String::new();
                    if participant.speaking {
                        flags.push_str(" (speaking)");
                    }
                    if participant.muted {
                        flags.push_str(" (muted)");
                    }
                    println!("  {}{flags}", participant.username);
                }
            }
            PromptCommand::CatchUp => start_catch_up(handle).await,
            PromptCommand::Stop => handle.stop_catch_up().await,
            PromptCommand::Close => handle.close().await?,
            PromptCommand::Quit => break,
        }
    }
    Ok(())
}

async fn start_catch_up(handle: &SessionHandle) {
    match handle.open_catch_up().await {
        Ok(0) => println!("No recent messages"),
        Ok(count) => {
            println!("Catching up on {count} messages");
            let _ = handle.start_catch_up();
        }
        Err(err) => println!("Catch-up unavailable: {err}"),
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<ClientEvent>) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ClientEvent::ConnectionStateChanged { state, attempt } => match state {
                ConnectionState::Open => println!("Connected"),
                ConnectionState::Closed => println!("Disconnected"),
                ConnectionState::Connecting if attempt > 0 => {
                    println!("Reconnecting (attempt {attempt})")
                }
                ConnectionState::Connecting => println!("Connecting"),
            },
            ClientEvent::ReconnectScheduled { attempt, delay } => {
                tracing::debug!(attempt, ?delay, "reconnect scheduled")
            }
            ClientEvent::RosterUpdated(participants) => {
                let names: Vec<_> = participants.iter().map(|p| p.username.as_str()).collect();
                println!("Online: {}", names.join(", "));
            }
            ClientEvent::SpeakingChanged { username, speaking } => {
                if speaking {
                    println!("{username} is speaking");
                }
            }
            ClientEvent::MuteChanged { username, muted } => {
                println!("{username} {}", if muted { "muted" } else { "unmuted" });
            }
            ClientEvent::PlaybackFinished {
                username,
                outcome: PlaybackOutcome::Failed(err),
                ..
            } => println!("Playback of {username} failed: {err}"),
            ClientEvent::PlaybackFinished { .. } => {}
            ClientEvent::CatchUpStateChanged(state) => println!("Catch-up {state:?}"),
            ClientEvent::Error(message) => println!("Error: {message}"),
        }
    }
}
