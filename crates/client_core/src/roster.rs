//! Connected usernames plus the local mute and speaking flags.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use shared::domain::Participant;
use tokio::sync::Mutex;

pub type SharedRoster = Arc<Mutex<ParticipantRoster>>;

#[derive(Debug, Default, Clone)]
pub struct ParticipantRoster {
    members: Vec<String>,
    // Count of clips currently rendering per username.
    speaking: HashMap<String, usize>,
    // Mute is owned by the local user and outlives roster replacement.
    muted: HashMap<String, bool>,
}

impl ParticipantRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRoster {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Replaces membership with exactly `usernames`, keeping their order.
    ///
    /// Speaking flags of departed usernames are dropped. Duplicate entries
    /// collapse onto their first occurrence.
    pub fn replace<I, S>(&mut self, usernames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        self.members = usernames
            .into_iter()
            .map(Into::into)
            .filter(|username| seen.insert(username.clone()))
            .collect();
        self.speaking.retain(|username, _| seen.contains(username));
    }

    pub fn set_muted(&mut self, username: &str, muted: bool) {
        self.muted.insert(username.to_string(), muted);
    }

    /// Flips the mute flag and returns the new value.
    pub fn toggle_muted(&mut self, username: &str) -> bool {
        let muted = !self.is_muted(username);
        self.set_muted(username, muted);
        muted
    }

    pub fn is_muted(&self, username: &str) -> bool {
        self.muted.get(username).copied().unwrap_or(false)
    }

    /// Counts overlapping clips from one speaker, so the flag stays up until
    /// the last one ends. Returns true when the visible flag changed.
    pub fn set_speaking(&mut self, username: &str, speaking: bool) -> bool {
        if speaking {
            let count = self.speaking.entry(username.to_string()).or_insert(0);
            *count += 1;
            return *count == 1;
        }
        match self.speaking.get_mut(username) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.speaking.remove(username);
                true
            }
            None => false,
        }
    }

    pub fn is_speaking(&self, username: &str) -> bool {
        self.speaking.contains_key(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.members.iter().any(|member| member == username)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.members
            .iter()
            .map(|username| Participant {
                username: username.clone(),
                muted: self.is_muted(username),
                speaking: self.is_speaking(username),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/roster_tests.rs"]
mod tests;
