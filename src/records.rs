//! Shared-state records and the synchronization layer
//!
//! Record layout (all keys prefixed by the session's game id):
//! - `<id>-player/1`, `<id>-player/2`: `name`, `direction`, `position`
//! - `<id>-status`: `player1-online`, `player2-online`, `player1-goals`,
//!   `player2-goals`
//!
//! Every field has exactly one writer. [`RecordLink`] only exposes writes for
//! fields the local client owns; everything else is read through
//! subscriptions.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::store::{RecordStore, SubscriptionId};

/// One of the two fixed player identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Slot {
    One,
    Two,
}

impl Slot {
    pub const BOTH: [Slot; 2] = [Slot::One, Slot::Two];

    /// 1 or 2
    pub fn number(self) -> u8 {
        match self {
            Slot::One => 1,
            Slot::Two => 2,
        }
    }

    /// Zero-based index, as used by the simulation's score arrays
    pub fn index(self) -> usize {
        self.number() as usize - 1
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Slot::One),
            1 => Some(Slot::Two),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Slot::One => Slot::Two,
            Slot::Two => Slot::One,
        }
    }

    /// Parse a URL fragment such as `#2`. An empty fragment means slot 1.
    pub fn from_fragment(fragment: &str) -> Result<Self> {
        let raw = fragment.trim_start_matches('#');
        if raw.is_empty() {
            return Ok(Slot::One);
        }
        raw.parse()
    }

    pub fn online_field(self) -> String {
        format!("player{}-online", self.number())
    }

    pub fn goals_field(self) -> String {
        format!("player{}-goals", self.number())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for Slot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(Slot::One),
            "2" => Ok(Slot::Two),
            other => Err(Error::InvalidSlot(other.to_string())),
        }
    }
}

impl TryFrom<u8> for Slot {
    type Error = Error;

    fn try_from(n: u8) -> Result<Self> {
        match n {
            1 => Ok(Slot::One),
            2 => Ok(Slot::Two),
            other => Err(Error::InvalidSlot(other.to_string())),
        }
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> u8 {
        slot.number()
    }
}

/// Stable session identifier shared by both controllers and the court
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from a connection uid (`<stamp>-<nonce>` → `<nonce>`)
    pub fn from_uid(uid: &str) -> Self {
        let fragment = uid.split('-').nth(1).unwrap_or(uid);
        Self(fragment.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn player_key(&self, slot: Slot) -> String {
        format!("{}-player/{}", self.0, slot.number())
    }

    pub fn status_key(&self) -> String {
        format!("{}-status", self.0)
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Paddle direction; `None` at the use sites means "not moving"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Contents of `<id>-player/<n>`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Slot>,
    #[serde(default)]
    pub direction: Option<Direction>,
    /// Normalized vertical position in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f32>,
}

impl PlayerRecord {
    /// Decode a record push field by field. A malformed field is logged and
    /// read as absent; the remaining fields still apply. `name` is also
    /// accepted as a string (`"2"` or `"#2"`).
    pub fn from_push(value: &Value) -> Option<Self> {
        let Some(fields) = value.as_object() else {
            log::warn!("Ignoring malformed player record push {value}");
            return None;
        };
        let field = |name: &str| fields.get(name).filter(|v| !v.is_null());

        let name = field("name").and_then(|v| match v {
            Value::String(s) => Slot::from_fragment(s)
                .inspect_err(|e| log::warn!("Ignoring player record name: {e}"))
                .ok(),
            other => decode("name", other),
        });
        Some(Self {
            name,
            direction: field("direction").and_then(|v| decode("direction", v)),
            position: field("position").and_then(|v| decode("position", v)),
        })
    }
}

/// Value of a `player<n>-goals` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalsField {
    pub amount: u32,
    /// Set on the goal that ends the match
    pub last_goal: bool,
}

/// Decode a pushed field value. `null` decodes to the type's null form when it
/// has one; anything else malformed is logged and dropped.
pub fn decode<T: DeserializeOwned>(field: &str, value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            log::warn!("Ignoring malformed {field} push {value}: {e}");
            None
        }
    }
}

/// Presence flags decode leniently: anything other than `true` is offline
pub fn decode_online(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

/// Bridge between one client and the shared records of one session
#[derive(Clone)]
pub struct RecordLink {
    store: Rc<dyn RecordStore>,
    game_id: GameId,
}

impl RecordLink {
    pub fn new(store: Rc<dyn RecordStore>, game_id: GameId) -> Self {
        Self { store, game_id }
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn store(&self) -> &Rc<dyn RecordStore> {
        &self.store
    }

    // === Writes (fire-and-forget, own fields only) ===

    /// Reset the slot's player record to `{name, direction: null}`
    pub fn init_player(&self, slot: Slot) {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(slot.number()));
        fields.insert("direction".into(), Value::Null);
        self.store.set_record(&self.game_id.player_key(slot), fields);
    }

    pub fn write_direction(&self, slot: Slot, direction: Option<Direction>) {
        let value = serde_json::to_value(direction).unwrap_or(Value::Null);
        self.store
            .set(&self.game_id.player_key(slot), "direction", value);
    }

    pub fn write_position(&self, slot: Slot, position: f32) {
        self.store.set(
            &self.game_id.player_key(slot),
            "position",
            json!(position.clamp(0.0, 1.0)),
        );
    }

    pub fn write_online(&self, slot: Slot, online: bool) {
        self.store
            .set(&self.game_id.status_key(), &slot.online_field(), json!(online));
    }

    /// Flip the slot's online flag based on the last known value
    pub fn toggle_online(&self, slot: Slot) -> bool {
        let current = self
            .store
            .get(&self.game_id.status_key(), &slot.online_field())
            .map(|v| decode_online(&v))
            .unwrap_or(false);
        self.write_online(slot, !current);
        !current
    }

    pub fn write_goals(&self, slot: Slot, goals: GoalsField) {
        let value = serde_json::to_value(goals).unwrap_or(Value::Null);
        self.store
            .set(&self.game_id.status_key(), &slot.goals_field(), value);
    }

    // === Reads ===

    pub fn online(&self, slot: Slot) -> bool {
        self.store
            .get(&self.game_id.status_key(), &slot.online_field())
            .map(|v| decode_online(&v))
            .unwrap_or(false)
    }

    // === Subscriptions ===

    /// Whole player record pushes for `slot`
    pub fn on_player<F>(&self, slot: Slot, f: F) -> SubscriptionId
    where
        F: Fn(PlayerRecord) + 'static,
    {
        let key = self.game_id.player_key(slot);
        self.store.subscribe(
            &key,
            None,
            Rc::new(move |value: &Value| {
                if let Some(record) = PlayerRecord::from_push(value) {
                    f(record);
                }
            }),
        )
    }

    pub fn on_online<F>(&self, slot: Slot, f: F) -> SubscriptionId
    where
        F: Fn(bool) + 'static,
    {
        self.store.subscribe(
            &self.game_id.status_key(),
            Some(&slot.online_field()),
            Rc::new(move |value: &Value| f(decode_online(value))),
        )
    }

    /// Goal pushes for `slot`. The initial `null` of an unscored slot is skipped.
    pub fn on_goals<F>(&self, slot: Slot, f: F) -> SubscriptionId
    where
        F: Fn(GoalsField) + 'static,
    {
        let field = slot.goals_field();
        let watched = field.clone();
        self.store.subscribe(
            &self.game_id.status_key(),
            Some(&watched),
            Rc::new(move |value: &Value| {
                if value.is_null() {
                    return;
                }
                if let Some(goals) = decode::<GoalsField>(&field, value) {
                    f(goals);
                }
            }),
        )
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.store.unsubscribe(id);
    }
}
