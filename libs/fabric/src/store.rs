//! Pending-record store backing the HTTP transport.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sheetwire_core::CallId;
use tracing::debug;

/// Response captured by `send`, not yet consulted by a poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

#[derive(Debug)]
enum Record {
    InFlight,
    Abandoned,
    Arrived(RawResponse),
}

/// Map from call id to a request's progress
///
/// Private to one transport instance. Every transition happens under the
/// entry's shard lock, so a poller giving up and a late response landing
/// cannot both leave something behind.
#[derive(Debug, Default)]
pub struct PendingStore {
    records: DashMap<CallId, Record>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that a request for `id` is on the wire
    pub fn begin(&self, id: &CallId) {
        self.records.insert(id.clone(), Record::InFlight);
    }

    /// Store the response for `id`
    ///
    /// Returns false when the poller already gave up on `id`; the response is
    /// discarded in that case.
    pub fn insert(&self, id: CallId, response: RawResponse) -> bool {
        match self.records.entry(id) {
            Entry::Occupied(entry) if matches!(entry.get(), Record::Abandoned) => {
                debug!(call_id = %entry.key(), "Discarding response for abandoned call");
                entry.remove();
                false
            }
            Entry::Occupied(mut entry) => {
                entry.insert(Record::Arrived(response));
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Record::Arrived(response));
                true
            }
        }
    }

    /// Remove and return the response for `id`, if it has arrived
    pub fn take(&self, id: &CallId) -> Option<RawResponse> {
        let (_, record) = self
            .records
            .remove_if(id, |_, record| matches!(record, Record::Arrived(_)))?;
        match record {
            Record::Arrived(response) => Some(response),
            Record::InFlight | Record::Abandoned => None,
        }
    }

    /// The poller for `id` stopped waiting
    pub fn abandon(&self, id: &CallId) {
        if let Entry::Occupied(mut entry) = self.records.entry(id.clone()) {
            let in_flight = matches!(entry.get(), Record::InFlight);
            let arrived = matches!(entry.get(), Record::Arrived(_));
            if in_flight {
                entry.insert(Record::Abandoned);
            } else if arrived {
                // Raced in after the deadline; nobody will consult it
                entry.remove();
            }
        }
    }

    /// The request for `id` ended without a response
    pub fn forget(&self, id: &CallId) {
        self.records
            .remove_if(id, |_, record| !matches!(record, Record::Arrived(_)));
    }

    /// Whether a response for `id` is waiting to be taken
    pub fn contains(&self, id: &CallId) -> bool {
        self.records
            .get(id)
            .is_some_and(|record| matches!(*record, Record::Arrived(_)))
    }

    /// Number of tracked ids in any state
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_removes_the_record() {
        let store = PendingStore::new();
        let id = CallId::from("x");
        assert!(store.insert(id.clone(), RawResponse::ok("{}")));
        assert!(store.contains(&id));
        assert_eq!(store.take(&id), Some(RawResponse::ok("{}")));
        assert!(store.take(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn in_flight_is_not_taken() {
        let store = PendingStore::new();
        let id = CallId::from("f");
        store.begin(&id);
        assert!(store.take(&id).is_none());
        assert!(!store.contains(&id));
        assert_eq!(store.len(), 1);
        store.forget(&id);
        assert!(store.is_empty());
    }

    #[test]
    fn late_response_after_abandon_is_discarded() {
        let store = PendingStore::new();
        let id = CallId::from("late");
        store.begin(&id);
        store.abandon(&id);
        assert!(!store.insert(id.clone(), RawResponse::ok("{}")));
        assert!(store.is_empty());
    }

    #[test]
    fn abandon_drops_an_unconsulted_response() {
        let store = PendingStore::new();
        let id = CallId::from("raced");
        store.insert(id.clone(), RawResponse::ok("{}"));
        store.abandon(&id);
        assert!(store.is_empty());
    }

    #[test]
    fn abandon_of_unknown_id_leaves_nothing() {
        let store = PendingStore::new();
        store.abandon(&CallId::from("never-sent"));
        assert!(store.is_empty());
    }

    #[test]
    fn forget_keeps_arrived_responses() {
        let store = PendingStore::new();
        let id = CallId::from("k");
        store.insert(id.clone(), RawResponse::ok("1"));
        store.forget(&id);
        assert!(store.contains(&id));
    }
}
