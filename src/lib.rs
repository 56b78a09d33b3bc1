//! Twin Pong - two phones as paddles, one shared screen as the court
//!
//! Core modules:
//! - `store`: Shared record store capability (get/set/subscribe) and an in-process store
//! - `records`: Record layout and the synchronization layer
//! - `scheduler`: Fixed-interval update/draw scheduler
//! - `session`: Presence-driven session state machine
//! - `input`: Raw button/key/tilt input to paddle commands
//! - `reconciler`: Goal writes and cross-peer goal feedback
//! - `court` / `controller`: The two kinds of client wired together
//! - `sim`: Local application of remote paddle commands

pub mod controller;
pub mod court;
pub mod error;
pub mod input;
pub mod reconciler;
pub mod records;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod sim;
pub mod store;

pub use controller::Controller;
pub use court::Court;
pub use error::{Error, Result};
pub use records::{Direction, GameId, GoalsField, PlayerRecord, RecordLink, Slot};
pub use settings::{SessionBootstrap, Settings};
pub use store::{MemoryStore, RecordStore};

/// Session configuration constants
pub mod consts {
    /// Default update rate
    pub const DEFAULT_FPS: u32 = 60;

    /// Extra tilt travel so the paddle reaches the edges before the phone is flat
    pub const DEFAULT_TILT_FACTOR: f32 = 0.5;
    /// Deadband on raw acceleration (m/s²)
    pub const DEFAULT_ACCELERATION_THRESHOLD: f32 = 0.2;
    /// Raw acceleration span mapped onto the full paddle travel (±g, rounded)
    pub const ACCELERATION_SPAN: f32 = 20.0;

    /// Largest dt (seconds) the simulation consumes in one update
    pub const MAX_UPDATE_DT: f64 = 0.1;

    /// Vibration when the own slot scores (ms)
    pub const GOAL_BUZZ: &[u32] = &[100];
    /// Vibration when the opponent scores (on/off ms)
    pub const ALERT_PATTERN: &[u32] = &[100, 300, 100, 300, 100];
}
