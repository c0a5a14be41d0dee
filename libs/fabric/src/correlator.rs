//! Matches replies arriving from a worker back to the call waiting on them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use sheetwire_core::{CallId, Reply};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};

struct Slot {
    tx: Option<oneshot::Sender<Reply>>,
    rx: Option<oneshot::Receiver<Reply>>,
}

impl Slot {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
        }
    }
}

/// Per-transport table of outstanding calls
///
/// A slot is created by whichever side touches an id first: the sender
/// opening it before the envelope leaves, or the waiter subscribing. Either
/// way a reply can never arrive before its slot exists.
pub struct Correlator {
    slots: DashMap<CallId, Slot>,
    closed: AtomicBool,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Make sure a slot exists for `id`
    ///
    /// The slot lives until a waiter on `id` finishes, `release` is called,
    /// or the correlator closes.
    pub fn open(&self, id: &CallId) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.slots.entry(id.clone()).or_insert_with(Slot::new);

        // close_all may have cleared the table between the check and the insert
        if self.is_closed() {
            self.slots.remove(id);
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// Claim the receiving side of `id`
    ///
    /// Only one waiter per id is allowed. The returned guard frees the slot
    /// when dropped, whatever the outcome.
    pub fn subscribe(&self, id: &CallId) -> Result<PendingCall<'_>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let rx = {
            let mut slot = self.slots.entry(id.clone()).or_insert_with(Slot::new);
            slot.rx.take()
        };

        if rx.is_some() && self.is_closed() {
            self.slots.remove(id);
            return Err(Error::ConnectionClosed);
        }

        match rx {
            Some(rx) => Ok(PendingCall {
                id: id.clone(),
                rx,
                correlator: self,
            }),
            None => Err(Error::Custom(format!("Call {} is already being awaited", id))),
        }
    }

    /// Deliver `reply` to the call waiting on `id`
    ///
    /// Returns false for ids that are unknown or already resolved; such
    /// replies are dropped.
    pub fn resolve(&self, id: &CallId, reply: Reply) -> bool {
        let tx = self.slots.get_mut(id).and_then(|mut slot| slot.tx.take());

        match tx {
            Some(tx) => {
                if tx.send(reply).is_err() {
                    debug!(call_id = %id, "Waiter went away before the reply arrived");
                    return false;
                }
                trace!(call_id = %id, "Reply delivered");
                true
            }
            None => {
                debug!(call_id = %id, "Dropping reply for unknown or resolved call");
                false
            }
        }
    }

    /// Forget `id` without resolving it
    pub fn release(&self, id: &CallId) {
        self.slots.remove(id);
    }

    /// Fail every outstanding call with `ConnectionClosed` and refuse new ones
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let outstanding = self.slots.len();
        self.slots.clear();
        if outstanding > 0 {
            debug!(outstanding, "Closed correlator with calls still pending");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_pending(&self, id: &CallId) -> bool {
        self.slots.contains_key(id)
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// A claimed call awaiting its reply
pub struct PendingCall<'a> {
    id: CallId,
    rx: oneshot::Receiver<Reply>,
    correlator: &'a Correlator,
}

impl PendingCall<'_> {
    pub fn id(&self) -> &CallId {
        &self.id
    }

    /// Wait at most `timeout` for the reply
    pub async fn wait(mut self, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Err(_) => Err(Error::Timeout(timeout)),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Ok(Ok(reply)) => reply.into_result().map_err(Error::from),
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.correlator.release(&self.id);
    }
}
