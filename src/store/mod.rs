//! Shared record store capability
//!
//! The session core only ever talks to a [`RecordStore`]: a set of named
//! records, each a JSON object of fields, with partial writes and push-based
//! subscriptions. The transport behind it (reconnection, authentication,
//! persistence) is somebody else's problem.
//!
//! Delivery contract the rest of the crate relies on:
//! - writes are fire-and-forget
//! - a new subscription receives the current value before any later change
//! - identical re-writes are delivered again (no deduplication)
//! - per-field order follows a single writer's write order; nothing is
//!   promised across fields or across writers

pub mod memory;

pub use memory::MemoryStore;

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::Result;

/// Handle returned by [`RecordStore::subscribe`]
pub type SubscriptionId = u64;

/// Push callback. Receives the field value, or the whole record as an object
/// for record-level subscriptions. Absent fields arrive as `Value::Null`.
pub type Callback = Rc<dyn Fn(&Value)>;

/// Capability set the session core depends on
pub trait RecordStore {
    /// Authenticate and return the connection-assigned uid
    fn login(&self, username: &str) -> Result<String>;

    /// Last known value of a field (`None` if never written)
    fn get(&self, key: &str, field: &str) -> Option<Value>;

    /// Write a single field
    fn set(&self, key: &str, field: &str, value: Value);

    /// Write several fields of one record at once
    fn set_record(&self, key: &str, fields: Map<String, Value>);

    /// Subscribe to one field (`Some`) or the whole record (`None`)
    fn subscribe(&self, key: &str, field: Option<&str>, callback: Callback) -> SubscriptionId;

    /// Drop a subscription; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);
}
