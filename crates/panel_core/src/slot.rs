use std::{fmt, sync::Arc};

use serde_json::Value;
use tokio::sync::watch;

/// Shared reactive value. Clones observe and write the same underlying cell.
#[derive(Clone)]
pub struct Slot {
    inner: Arc<watch::Sender<Value>>,
}

impl Slot {
    pub fn new(initial: Value) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            inner: Arc::new(tx),
        }
    }

    /// Output slots start out as an empty string until telemetry arrives.
    pub fn empty_output() -> Self {
        Self::new(Value::String(String::new()))
    }

    pub fn get(&self) -> Value {
        self.inner.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        self.inner.send_replace(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<Value> {
        self.inner.subscribe()
    }

    pub fn same_slot(&self, other: &Slot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&*self.inner.borrow()).finish()
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}
