//! Presence-driven session state machine
//!
//! Each client mirrors the two `player<n>-online` flags and re-derives the
//! session mode whenever either push arrives. Only "both online" plays; one
//! player online waits and never auto-starts single-player play.

use serde::{Deserialize, Serialize};

use crate::records::Slot;

/// Session mode as seen by one client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionMode {
    /// Nobody online
    #[default]
    Idle,
    /// Exactly one player online
    WaitingForPeer,
    /// Local single-player play (started explicitly, never by presence)
    ActiveSingle,
    /// Both players online
    ActiveDouble,
    /// A blocking prompt has the scheduler stopped
    Paused,
}

impl SessionMode {
    /// Whether the scheduler should be ticking in this mode
    pub fn is_playing(self) -> bool {
        matches!(self, SessionMode::ActiveSingle | SessionMode::ActiveDouble)
    }
}

/// What the owner of the scheduler has to do after an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stop the game and the scheduler
    Stop,
    /// (Re)start the game in two-player mode and run the scheduler
    StartDouble,
    /// Start local single-player play
    StartSingle,
    /// Already in the right mode
    Keep,
}

/// Mode for a pair of presence flags
pub fn derive_mode(p1: bool, p2: bool) -> SessionMode {
    match (p1, p2) {
        (true, true) => SessionMode::ActiveDouble,
        (false, false) => SessionMode::Idle,
        _ => SessionMode::WaitingForPeer,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    presence: [bool; 2],
    mode: SessionMode,
    paused_from: Option<SessionMode>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Last delivered flag for `slot`
    pub fn presence(&self, slot: Slot) -> bool {
        self.presence[slot.index()]
    }

    /// Record a presence push for one slot and re-derive the mode
    pub fn on_presence(&mut self, slot: Slot, online: bool) -> Transition {
        self.presence[slot.index()] = online;
        self.evaluate()
    }

    /// Re-derive the mode from the mirrored flags
    pub fn evaluate(&mut self) -> Transition {
        let [p1, p2] = self.presence;
        let next = derive_mode(p1, p2);
        let previous = self.mode;
        self.mode = next;
        self.paused_from = None;

        if next != previous {
            log::info!("Session {previous:?} -> {next:?} (p1 online: {p1}, p2 online: {p2})");
        }

        match next {
            SessionMode::ActiveDouble if previous == SessionMode::ActiveDouble => Transition::Keep,
            SessionMode::ActiveDouble => Transition::StartDouble,
            _ => Transition::Stop,
        }
    }

    /// Begin local single-player play regardless of presence. The next
    /// presence push takes over again.
    pub fn start_single(&mut self) -> Transition {
        if self.mode == SessionMode::ActiveSingle {
            return Transition::Keep;
        }
        log::info!("Session {:?} -> ActiveSingle", self.mode);
        self.mode = SessionMode::ActiveSingle;
        self.paused_from = None;
        Transition::StartSingle
    }

    /// Enter `Paused` for the duration of a blocking prompt
    pub fn pause(&mut self) {
        if self.mode != SessionMode::Paused {
            self.paused_from = Some(self.mode);
            self.mode = SessionMode::Paused;
        }
    }

    /// Leave `Paused`, returning the restored mode
    pub fn resume(&mut self) -> SessionMode {
        if let Some(previous) = self.paused_from.take() {
            self.mode = previous;
        }
        self.mode
    }
}

/// Checked/unchecked presence indicator per slot. Pure projection of the
/// pushes; the state machine never reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceIndicators {
    checked: [bool; 2],
}

impl PresenceIndicators {
    pub fn set(&mut self, slot: Slot, online: bool) {
        self.checked[slot.index()] = online;
    }

    pub fn is_checked(&self, slot: Slot) -> bool {
        self.checked[slot.index()]
    }
}
