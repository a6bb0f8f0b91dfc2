use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_channel::Sender;

use crate::firestore::document::FirestoreDocument;
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::DocumentKey;
use crate::firestore::query::Query;
use crate::util::Subscription;

/// Stream produced by [`FirestoreAdapter::watch_one`](crate::firestore::FirestoreAdapter::watch_one).
pub type DocumentStream = Subscription<FirestoreResult<Option<FirestoreDocument>>>;

/// Stream produced by [`FirestoreAdapter::watch_many`](crate::firestore::FirestoreAdapter::watch_many);
/// every item is the complete result set.
pub type QueryStream = Subscription<FirestoreResult<Vec<FirestoreDocument>>>;

/// What a watch observes.
#[derive(Clone, Debug)]
pub(crate) enum WatchTarget {
    Document(DocumentKey),
    Query(Query),
}

impl WatchTarget {
    fn affected_by(&self, key: &DocumentKey) -> bool {
        match self {
            WatchTarget::Document(watched) => watched == key,
            WatchTarget::Query(query) => query.collection() == key.collection(),
        }
    }
}

/// Result of reading a [`WatchTarget`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Snapshot {
    Document(Option<FirestoreDocument>),
    Query(Vec<FirestoreDocument>),
}

enum WatchSink {
    Document(Sender<FirestoreResult<Option<FirestoreDocument>>>),
    Query(Sender<FirestoreResult<Vec<FirestoreDocument>>>),
}

impl WatchSink {
    fn send(&self, result: FirestoreResult<Snapshot>) -> bool {
        match (self, result) {
            (WatchSink::Document(sender), Ok(Snapshot::Document(document))) => {
                sender.try_send(Ok(document)).is_ok()
            }
            (WatchSink::Query(sender), Ok(Snapshot::Query(documents))) => {
                sender.try_send(Ok(documents)).is_ok()
            }
            (WatchSink::Document(sender), Err(err)) => sender.try_send(Err(err)).is_ok(),
            (WatchSink::Query(sender), Err(err)) => sender.try_send(Err(err)).is_ok(),
            _ => false,
        }
    }
}

struct Watch {
    target: WatchTarget,
    sink: WatchSink,
    last: Option<Snapshot>,
}

/// Live watches of one connection. Each watch remembers the last snapshot it
/// delivered and is only notified when a re-read differs.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    watches: Mutex<BTreeMap<u64, Watch>>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub(crate) fn register_document(
        &self,
        key: DocumentKey,
        sender: Sender<FirestoreResult<Option<FirestoreDocument>>>,
    ) -> u64 {
        self.insert(WatchTarget::Document(key), WatchSink::Document(sender))
    }

    pub(crate) fn register_query(
        &self,
        query: Query,
        sender: Sender<FirestoreResult<Vec<FirestoreDocument>>>,
    ) -> u64 {
        self.insert(WatchTarget::Query(query), WatchSink::Query(sender))
    }

    fn insert(&self, target: WatchTarget, sink: WatchSink) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        log::debug!("registered Firestore watch {id} on {target:?}");
        self.watches.lock().unwrap().insert(
            id,
            Watch {
                target,
                sink,
                last: None,
            },
        );
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        if self.watches.lock().unwrap().remove(&id).is_some() {
            log::debug!("removed Firestore watch {id}");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.watches.lock().unwrap().len()
    }

    /// Watches whose snapshot a write to `key` may change.
    pub(crate) fn affected(&self, key: &DocumentKey) -> Vec<(u64, WatchTarget)> {
        self.watches
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, watch)| watch.target.affected_by(key))
            .map(|(id, watch)| (*id, watch.target.clone()))
            .collect()
    }

    /// Sends the first snapshot unless a write already delivered a newer one.
    pub(crate) fn deliver_initial(&self, id: u64, result: FirestoreResult<Snapshot>) {
        let mut watches = self.watches.lock().unwrap();
        let Some(watch) = watches.get_mut(&id) else {
            return;
        };
        if watch.last.is_some() {
            return;
        }
        if let Ok(snapshot) = &result {
            watch.last = Some(snapshot.clone());
        }
        if !watch.sink.send(result) {
            log::warn!("Firestore watch {id} is closed; dropping snapshot");
        }
    }

    /// Sends `result` when it differs from the last delivered snapshot.
    /// Errors are always sent.
    pub(crate) fn deliver(&self, id: u64, result: FirestoreResult<Snapshot>) {
        let mut watches = self.watches.lock().unwrap();
        let Some(watch) = watches.get_mut(&id) else {
            return;
        };
        if let Ok(snapshot) = &result {
            if watch.last.as_ref() == Some(snapshot) {
                return;
            }
            watch.last = Some(snapshot.clone());
        }
        if !watch.sink.send(result) {
            log::warn!("Firestore watch {id} is closed; dropping snapshot");
        }
    }
}
