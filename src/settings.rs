//! Session settings and bootstrap
//!
//! Settings are layered: built-in defaults, then an optional JSON document,
//! then the page query string (`?gameId=...&dsHost=...&fps=...`). The store
//! host falls back to `TWIN_PONG_STORE_HOST` when the query string has none.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_ACCELERATION_THRESHOLD, DEFAULT_FPS, DEFAULT_TILT_FACTOR};
use crate::error::{Error, Result};
use crate::records::{GameId, Slot};

/// Environment variable consulted for the store host
pub const STORE_HOST_ENV: &str = "TWIN_PONG_STORE_HOST";

/// Session settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Target update rate (ticks per second)
    pub fps: u32,
    /// Collect and draw frame statistics
    pub stats: bool,
    /// Surface size override (defaults to the surface's own size)
    pub width: Option<u32>,
    pub height: Option<u32>,

    // === Tilt input ===
    /// Extra travel applied to the tilt mapping (0 = none)
    pub tilt_factor: f32,
    /// Minimum change in raw acceleration before a new position is written
    pub acceleration_threshold: f32,

    // === Record store ===
    /// `host:port` of the record store
    #[serde(rename = "dsHost")]
    pub store_host: String,
    /// Session id; `None` until bootstrap assigns one
    pub game_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            stats: false,
            width: None,
            height: None,

            tilt_factor: DEFAULT_TILT_FACTOR,
            acceleration_threshold: DEFAULT_ACCELERATION_THRESHOLD,

            store_host: "localhost:6020".to_string(),
            game_id: None,
        }
    }
}

impl Settings {
    /// Parse a JSON settings document; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overridden by a query string
    pub fn from_query(query: &str) -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_query(query)?;
        Ok(settings)
    }

    /// Apply `key=value` pairs from a query string. Unknown keys are ignored.
    pub fn apply_query(&mut self, query: &str) -> Result<()> {
        let params = parse_query(query);
        let mut host_given = false;

        for (key, value) in &params {
            match key.as_str() {
                "gameId" if !value.is_empty() => self.game_id = Some(value.clone()),
                "dsHost" if !value.is_empty() => {
                    self.store_host = value.clone();
                    host_given = true;
                }
                "fps" => self.fps = parse_value(key, value)?,
                "stats" => self.stats = matches!(value.as_str(), "" | "1" | "true" | "on"),
                "width" => self.width = Some(parse_value(key, value)?),
                "height" => self.height = Some(parse_value(key, value)?),
                "tiltFactor" => self.tilt_factor = parse_value(key, value)?,
                "accelerationThreshold" => self.acceleration_threshold = parse_value(key, value)?,
                _ => {}
            }
        }

        if !host_given {
            if let Ok(host) = std::env::var(STORE_HOST_ENV) {
                if !host.is_empty() {
                    log::info!("Using store host from {STORE_HOST_ENV}: {host}");
                    self.store_host = host;
                }
            }
        }

        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(invalid("fps", self.fps));
        }
        if self.tilt_factor.is_nan() || self.tilt_factor < 0.0 {
            return Err(invalid("tiltFactor", self.tilt_factor));
        }
        if self.acceleration_threshold.is_nan() || self.acceleration_threshold < 0.0 {
            return Err(invalid("accelerationThreshold", self.acceleration_threshold));
        }
        Ok(())
    }

    /// Milliseconds between ticks
    pub fn interval_ms(&self) -> f64 {
        1000.0 / self.fps as f64
    }

    pub fn game_id(&self) -> Option<GameId> {
        self.game_id.as_deref().map(GameId::new)
    }
}

/// Split `?a=1&b=2` into a map. A missing `=` yields an empty value.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: impl ToString) -> Error {
    Error::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// What the court does once logged in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBootstrap {
    /// No session id yet: reload with this query string
    Redirect { query: String },
    /// Session id known: hand these join links to the two controllers
    Ready {
        game_id: GameId,
        join_links: [String; 2],
    },
}

impl SessionBootstrap {
    /// Decide from the current query string and the connection uid
    pub fn resolve(query: &str, uid: &str) -> Self {
        let query = query.trim_start_matches('?');
        let params = parse_query(query);

        match params.get("gameId").filter(|id| !id.is_empty()) {
            Some(id) => Self::Ready {
                game_id: GameId::new(id.clone()),
                join_links: Slot::BOTH.map(|slot| controller_link(query, slot)),
            },
            None => {
                let assigned = format!("gameId={}", GameId::from_uid(uid));
                let query = if query.is_empty() {
                    assigned
                } else {
                    format!("{query}&{assigned}")
                };
                log::info!("No session id in query string, redirecting to ?{query}");
                Self::Redirect { query }
            }
        }
    }
}

/// Link a controller opens to join `slot` of the session in `query`
pub fn controller_link(query: &str, slot: Slot) -> String {
    format!(
        "controls.html?{}#{}",
        query.trim_start_matches('?'),
        slot.number()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.fps, 60);
        assert!((settings.interval_ms() - 1000.0 / 60.0).abs() < 1e-9);
        assert!(!settings.stats);
        assert!(settings.game_id().is_none());
    }

    #[test]
    fn test_query_overrides() {
        let settings =
            Settings::from_query("?gameId=x7k&dsHost=10.0.0.2:6020&fps=30&stats=true").unwrap();
        assert_eq!(settings.game_id(), Some(GameId::new("x7k")));
        assert_eq!(settings.store_host, "10.0.0.2:6020");
        assert_eq!(settings.fps, 30);
        assert!(settings.stats);
    }

    #[test]
    fn test_invalid_fps_rejected() {
        assert!(matches!(
            Settings::from_query("fps=fast"),
            Err(Error::InvalidSetting { .. })
        ));
        assert!(Settings::from_query("fps=0").is_err());
    }

    #[test]
    fn test_json_keeps_missing_defaults() {
        let settings = Settings::from_json(r#"{"fps": 50, "tiltFactor": 1.0}"#).unwrap();
        assert_eq!(settings.fps, 50);
        assert_eq!(settings.tilt_factor, 1.0);
        assert_eq!(
            settings.acceleration_threshold,
            DEFAULT_ACCELERATION_THRESHOLD
        );
    }

    #[test]
    fn test_parse_query() {
        let params = parse_query("?a=1&b&c=x=y");
        assert_eq!(params["a"], "1");
        assert_eq!(params["b"], "");
        assert_eq!(params["c"], "x=y");
    }

    #[test]
    fn test_bootstrap_redirects_without_game_id() {
        assert_eq!(
            SessionBootstrap::resolve("", "k2j4h1-9xq7z"),
            SessionBootstrap::Redirect {
                query: "gameId=9xq7z".to_string()
            }
        );
        assert_eq!(
            SessionBootstrap::resolve("?stats=1", "k2j4h1-9xq7z"),
            SessionBootstrap::Redirect {
                query: "stats=1&gameId=9xq7z".to_string()
            }
        );
    }

    #[test]
    fn test_bootstrap_ready_builds_join_links() {
        let SessionBootstrap::Ready {
            game_id,
            join_links,
        } = SessionBootstrap::resolve("?gameId=9xq7z", "ignored-uid")
        else {
            panic!("expected Ready");
        };
        assert_eq!(game_id.as_str(), "9xq7z");
        assert_eq!(join_links[0], "controls.html?gameId=9xq7z#1");
        assert_eq!(join_links[1], "controls.html?gameId=9xq7z#2");
    }
}
