//! In-process record store
//!
//! Holds every record in one place and queues pushes until [`MemoryStore::pump`]
//! runs, which mirrors how a networked store hands deliveries to the event
//! loop between frames. Queued deliveries for the same subscription coalesce,
//! so a burst of writes before the next pump is observed as its final value.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde_json::{Map, Value};

use super::{Callback, RecordStore, SubscriptionId};
use crate::error::{Error, Result};

struct Subscription {
    key: String,
    field: Option<String>,
    callback: Callback,
}

struct Inner {
    records: BTreeMap<String, Map<String, Value>>,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    /// Delivery order (one entry per subscription with a pending value)
    queue: VecDeque<SubscriptionId>,
    /// Latest undelivered value per subscription
    pending: HashMap<SubscriptionId, Value>,
    next_id: SubscriptionId,
    connected: bool,
    accept_logins: bool,
    rng: Pcg32,
}

impl Inner {
    fn enqueue(&mut self, id: SubscriptionId, value: Value) {
        if self.pending.insert(id, value).is_none() {
            self.queue.push_back(id);
        }
    }

    fn current_value(&self, key: &str, field: Option<&str>) -> Value {
        let record = self.records.get(key);
        match field {
            Some(field) => record
                .and_then(|r| r.get(field))
                .cloned()
                .unwrap_or(Value::Null),
            None => Value::Object(record.cloned().unwrap_or_default()),
        }
    }

    /// Queue a push for every subscription watching `key` (and `field`, if given)
    fn notify(&mut self, key: &str, field: Option<&str>) {
        let targets: Vec<(SubscriptionId, Option<String>)> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.key == key)
            .filter(|(_, sub)| match (field, sub.field.as_deref()) {
                (Some(changed), Some(watched)) => changed == watched,
                _ => true,
            })
            .map(|(id, sub)| (*id, sub.field.clone()))
            .collect();

        for (id, watched) in targets {
            let value = self.current_value(key, watched.as_deref());
            self.enqueue(id, value);
        }
    }
}

/// Record store living entirely in this process
pub struct MemoryStore {
    host: String,
    inner: RefCell<Inner>,
}

impl MemoryStore {
    /// Create a store with a fixed uid seed
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_seed(host, 0x7477_696e)
    }

    pub fn with_seed(host: impl Into<String>, seed: u64) -> Self {
        Self {
            host: host.into(),
            inner: RefCell::new(Inner {
                records: BTreeMap::new(),
                subscriptions: BTreeMap::new(),
                queue: VecDeque::new(),
                pending: HashMap::new(),
                next_id: 1,
                connected: true,
                accept_logins: true,
                rng: Pcg32::seed_from_u64(seed),
            }),
        }
    }

    /// Deliver every queued push, including pushes queued by the callbacks
    /// themselves. Returns the number of callbacks invoked.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let Some(id) = inner.queue.pop_front() else {
                    break;
                };
                let value = inner.pending.remove(&id);
                let callback = inner.subscriptions.get(&id).map(|s| s.callback.clone());
                value.zip(callback)
            };
            // Callback runs with no borrow held so it may write back
            if let Some((value, callback)) = next {
                callback(&value);
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of subscriptions with an undelivered push
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Simulate losing the connection: writes become silent no-ops
    pub fn disconnect(&self) {
        log::warn!("Record store {} disconnected", self.host);
        self.inner.borrow_mut().connected = false;
    }

    pub fn reconnect(&self) {
        log::info!("Record store {} reconnected", self.host);
        self.inner.borrow_mut().connected = true;
    }

    /// Make subsequent logins fail (authentication rejected)
    pub fn reject_logins(&self) {
        self.inner.borrow_mut().accept_logins = false;
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl RecordStore for MemoryStore {
    fn login(&self, username: &str) -> Result<String> {
        let mut inner = self.inner.borrow_mut();
        if !inner.accept_logins || !inner.connected {
            return Err(Error::Connectivity {
                host: self.host.clone(),
                reason: format!("login rejected for {username:?}"),
            });
        }
        let stamp: u64 = inner.rng.random_range(36u64.pow(7)..36u64.pow(8));
        let nonce: u64 = inner.rng.random_range(36u64.pow(9)..36u64.pow(10));
        let uid = format!("{}-{}", to_base36(stamp), to_base36(nonce));
        log::info!("Logged in to {} as {:?} (uid {})", self.host, username, uid);
        Ok(uid)
    }

    fn get(&self, key: &str, field: &str) -> Option<Value> {
        self.inner
            .borrow()
            .records
            .get(key)
            .and_then(|r| r.get(field))
            .cloned()
    }

    fn set(&self, key: &str, field: &str, value: Value) {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            log::debug!("Dropped write {key}.{field} while disconnected");
            return;
        }
        log::debug!("set {key}.{field} = {value}");
        inner
            .records
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        inner.notify(key, Some(field));
    }

    fn set_record(&self, key: &str, fields: Map<String, Value>) {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            log::debug!("Dropped record write {key} while disconnected");
            return;
        }
        inner.records.insert(key.to_string(), fields);
        inner.notify(key, None);
    }

    fn subscribe(&self, key: &str, field: Option<&str>, callback: Callback) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscriptions.insert(
            id,
            Subscription {
                key: key.to_string(),
                field: field.map(str::to_string),
                callback,
            },
        );
        let initial = inner.current_value(key, field);
        inner.enqueue(id, initial);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.borrow_mut();
        inner.subscriptions.remove(&id);
        inner.pending.remove(&id);
        inner.queue.retain(|queued| *queued != id);
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<Value>>>, Callback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Rc::new(move |v: &Value| sink.borrow_mut().push(v.clone())))
    }

    #[test]
    fn test_subscribe_delivers_current_value_first() {
        let store = MemoryStore::new("test");
        store.set("g-status", "player1-online", json!(true));

        let (seen, cb) = recorder();
        store.subscribe("g-status", Some("player1-online"), cb);
        assert_eq!(store.pump(), 1);
        assert_eq!(*seen.borrow(), vec![json!(true)]);
    }

    #[test]
    fn test_subscribe_to_missing_field_delivers_null() {
        let store = MemoryStore::new("test");
        let (seen, cb) = recorder();
        store.subscribe("g-status", Some("player2-goals"), cb);
        store.pump();
        assert_eq!(*seen.borrow(), vec![Value::Null]);
    }

    #[test]
    fn test_pending_writes_coalesce_to_last_value() {
        let store = MemoryStore::new("test");
        let (seen, cb) = recorder();
        store.subscribe("g-player/1", Some("direction"), cb);
        store.pump();

        store.set("g-player/1", "direction", json!("up"));
        store.set("g-player/1", "direction", json!("down"));
        assert_eq!(store.pending(), 1);
        store.pump();
        assert_eq!(*seen.borrow(), vec![Value::Null, json!("down")]);
    }

    #[test]
    fn test_identical_rewrite_is_delivered_again() {
        let store = MemoryStore::new("test");
        let (seen, cb) = recorder();
        store.subscribe("g-player/1", Some("direction"), cb);
        store.set("g-player/1", "direction", json!("up"));
        store.pump();
        store.set("g-player/1", "direction", json!("up"));
        store.pump();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[1], json!("up"));
    }

    #[test]
    fn test_field_subscription_ignores_other_fields() {
        let store = MemoryStore::new("test");
        let (seen, cb) = recorder();
        store.subscribe("g-status", Some("player1-online"), cb);
        store.pump();
        store.set("g-status", "player2-online", json!(true));
        assert_eq!(store.pump(), 0);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_record_subscription_sees_whole_record() {
        let store = MemoryStore::new("test");
        let (seen, cb) = recorder();
        store.subscribe("g-player/2", None, cb);
        store.set("g-player/2", "direction", json!("down"));
        store.set("g-player/2", "position", json!(0.25));
        store.pump();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], json!({"direction": "down", "position": 0.25}));
    }

    #[test]
    fn test_callbacks_may_write_back() {
        let store = Rc::new(MemoryStore::new("test"));
        let writer = store.clone();
        store.subscribe(
            "g-status",
            Some("player1-online"),
            Rc::new(move |v: &Value| {
                if v == &json!(true) {
                    writer.set("g-status", "player2-online", json!(true));
                }
            }),
        );
        store.set("g-status", "player1-online", json!(true));
        store.pump();
        assert_eq!(store.get("g-status", "player2-online"), Some(json!(true)));
    }

    #[test]
    fn test_disconnected_writes_are_dropped() {
        let store = MemoryStore::new("test");
        store.disconnect();
        store.set("g-status", "player1-online", json!(true));
        assert_eq!(store.get("g-status", "player1-online"), None);
        store.reconnect();
        store.set("g-status", "player1-online", json!(true));
        assert_eq!(store.get("g-status", "player1-online"), Some(json!(true)));
    }

    #[test]
    fn test_unsubscribe_drops_pending_push() {
        let store = MemoryStore::new("test");
        let (seen, cb) = recorder();
        let id = store.subscribe("g-status", Some("player1-online"), cb);
        store.unsubscribe(id);
        assert_eq!(store.pump(), 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_login_uid_has_fragment() {
        let store = MemoryStore::new("test");
        let uid = store.login("server").unwrap();
        let (stamp, nonce) = uid.split_once('-').unwrap();
        assert!(!stamp.is_empty());
        assert!(!nonce.is_empty());

        store.reject_logins();
        assert!(matches!(store.login("1"), Err(Error::Connectivity { .. })));
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
