//! Error types
//!
//! Only construction-time preconditions and configuration parsing return
//! errors. Runtime failures (dropped pushes, undecodable field values) are
//! logged and leave the last-known state in place.

use thiserror::Error;

/// Errors raised while setting up a court or controller
#[derive(Debug, Error)]
pub enum Error {
    /// The court was built without a display surface
    #[error("no display surface available")]
    MissingSurface,
    /// Login against the record store failed
    #[error("could not connect to record store at {host}: {reason}")]
    Connectivity { host: String, reason: String },
    /// A player slot fragment or number was not 1 or 2
    #[error("invalid player slot: {0:?}")]
    InvalidSlot(String),
    /// A configuration value could not be parsed or is out of range
    #[error("invalid setting {key}={value:?}")]
    InvalidSetting { key: String, value: String },
    /// A record field held a value of the wrong shape
    #[error("could not decode record field: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
