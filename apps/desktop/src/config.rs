use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::{Backoff, SessionOptions, SlotPolicy};

const DEFAULT_CONFIG_FILE: &str = "holler.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub username: Option<String>,
    pub player_command: String,
    pub recorder_command: String,
    pub clip_extension: String,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub catch_up_gap_ms: u64,
    pub shared_playback_slot: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            username: None,
            player_command: "ffplay -nodisp -autoexit -loglevel quiet {file}".into(),
            recorder_command: "ffmpeg -loglevel quiet -f pulse -i default -c:a libopus -b:a 12k {file}"
                .into(),
            clip_extension: "webm".into(),
            reconnect_base_ms: 1_000,
            reconnect_cap_ms: 30_000,
            catch_up_gap_ms: 500,
            shared_playback_slot: false,
        }
    }
}

impl Settings {
    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::new(self.server_url.clone());
        options.backoff = Backoff {
            base: Duration::from_millis(self.reconnect_base_ms),
            cap: Duration::from_millis(self.reconnect_cap_ms),
        };
        options.pacing_gap = Duration::from_millis(self.catch_up_gap_ms);
        options.slot_policy = if self.shared_playback_slot {
            SlotPolicy::Shared
        } else {
            SlotPolicy::PerContext
        };
        options
    }

    fn apply(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "server_url" => self.server_url = value.to_string(),
            "username" => self.username = Some(value.to_string()),
            "player_command" => self.player_command = value.to_string(),
            "recorder_command" => self.recorder_command = value.to_string(),
            "clip_extension" => self.clip_extension = value.to_string(),
            "reconnect_base_ms" => self.reconnect_base_ms = parse_number(key, value)?,
            "reconnect_cap_ms" => self.reconnect_cap_ms = parse_number(key, value)?,
            "catch_up_gap_ms" => self.catch_up_gap_ms = parse_number(key, value)?,
            "shared_playback_slot" => {
                self.shared_playback_slot = value
                    .parse()
                    .with_context(|| format!("invalid boolean for {key}: '{value}'"))?
            }
            _ => tracing::warn!(key, "ignoring unknown setting"),
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid number for {key}: '{value}'"))
}

const ENV_KEYS: &[&str] = &[
    "server_url",
    "username",
    "player_command",
    "recorder_command",
    "clip_extension",
    "reconnect_base_ms",
    "reconnect_cap_ms",
    "catch_up_gap_ms",
    "shared_playback_slot",
];

/// Defaults, then the config file, then `HOLLER_*` and `APP__*` variables.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if required => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |name| std::env::var(name).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let table: HashMap<String, toml::Value> = toml::from_str(raw)?;
    for (key, value) in table {
        let value = match value {
            toml::Value::String(text) => text,
            other => other.to_string(),
        };
        settings.apply(&key, &value)?;
    }
    Ok(())
}

fn apply_env<F>(settings: &mut Settings, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for key in ENV_KEYS {
        let upper = key.to_ascii_uppercase();
        if let Some(value) = lookup(&format!("HOLLER_{upper}")) {
            settings.apply(key, &value)?;
        }
        if let Some(value) = lookup(&format!("APP__{upper}")) {
            settings.apply(key, &value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
