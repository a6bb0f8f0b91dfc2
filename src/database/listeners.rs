use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_channel::Sender;
use serde_json::Value;

use crate::database::error::{DatabaseAdapterError, DatabaseResult};
use crate::database::node::{ordered_children, previous_key, Node};
use crate::database::path::{join_path, paths_related};
use crate::util::Subscription;

/// Stream of full-value snapshots produced by
/// [`DatabaseAdapter::subscribe`](crate::database::DatabaseAdapter::subscribe).
pub type NodeStream = Subscription<DatabaseResult<Node>>;

/// Stream of one kind of child event.
pub type ChildEventStream = Subscription<DatabaseResult<ChildEvent>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildEventKind {
    Added,
    Changed,
    Removed,
}

impl ChildEventKind {
    pub const ALL: [ChildEventKind; 3] = [
        ChildEventKind::Added,
        ChildEventKind::Changed,
        ChildEventKind::Removed,
    ];
}

/// A change to one direct child of a subscribed location.
///
/// `previous_key` names the sibling that precedes the child in key order
/// (before removal for `Removed`), or `None` when the child is first.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildEvent {
    pub kind: ChildEventKind,
    pub node: Node,
    pub previous_key: Option<String>,
}

enum ListenerSink {
    Value(Sender<DatabaseResult<Node>>),
    Child(ChildEventKind, Sender<DatabaseResult<ChildEvent>>),
}

struct Listener {
    path: Vec<String>,
    sink: ListenerSink,
    /// Set once a write event reached this listener.
    delivered: bool,
}

/// Values read at listener locations, keyed by path.
pub(crate) type LocationValues = BTreeMap<Vec<String>, Value>;

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn register_value(&self, path: Vec<String>, sender: Sender<DatabaseResult<Node>>) -> u64 {
        self.insert(Listener {
            path,
            sink: ListenerSink::Value(sender),
            delivered: false,
        })
    }

    pub(crate) fn register_child(
        &self,
        path: Vec<String>,
        kind: ChildEventKind,
        sender: Sender<DatabaseResult<ChildEvent>>,
    ) -> u64 {
        self.insert(Listener {
            path,
            sink: ListenerSink::Child(kind, sender),
            delivered: false,
        })
    }

    fn insert(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        log::debug!("registered listener {id} at '/{}'", join_path(&listener.path));
        self.listeners.lock().unwrap().insert(id, listener);
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        if self.listeners.lock().unwrap().remove(&id).is_some() {
            log::debug!("removed listener {id}");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Sends the value read at subscribe time unless a write event already
    /// reached the listener.
    pub(crate) fn deliver_initial_value(&self, id: u64, node: Node) {
        let listeners = self.listeners.lock().unwrap();
        let Some(listener) = listeners.get(&id) else {
            return;
        };
        if listener.delivered {
            return;
        }
        if let ListenerSink::Value(sender) = &listener.sink {
            let _ = sender.try_send(Ok(node));
        }
    }

    /// Replays existing children under the same rule as
    /// [`Self::deliver_initial_value`].
    pub(crate) fn deliver_initial_children(&self, id: u64, events: Vec<ChildEvent>) {
        let listeners = self.listeners.lock().unwrap();
        let Some(listener) = listeners.get(&id) else {
            return;
        };
        if listener.delivered {
            return;
        }
        if let ListenerSink::Child(_, sender) = &listener.sink {
            for event in events {
                let _ = sender.try_send(Ok(event));
            }
        }
    }

    /// Distinct listener locations that a write at `changed` may affect.
    pub(crate) fn affected_paths(&self, changed: &[String]) -> Vec<Vec<String>> {
        let listeners = self.listeners.lock().unwrap();
        let mut paths: Vec<Vec<String>> = Vec::new();
        for listener in listeners.values() {
            if paths_related(&listener.path, changed) && !paths.contains(&listener.path) {
                paths.push(listener.path.clone());
            }
        }
        paths
    }

    /// Delivers value and child events for every listener whose location
    /// changed between `before` and `after`.
    pub(crate) fn dispatch(&self, before: &LocationValues, after: &LocationValues) {
        let mut listeners = self.listeners.lock().unwrap();
        for (id, listener) in listeners.iter_mut() {
            let (Some(old), Some(new)) = (before.get(&listener.path), after.get(&listener.path))
            else {
                continue;
            };
            if old == new {
                continue;
            }
            let delivered = match &listener.sink {
                ListenerSink::Value(sender) => sender
                    .try_send(Ok(Node::from_value(listener.path.last(), new.clone())))
                    .is_ok(),
                ListenerSink::Child(kind, sender) => {
                    let events = child_events(*kind, old, new);
                    if events.is_empty() {
                        continue;
                    }
                    events
                        .into_iter()
                        .all(|event| sender.try_send(Ok(event)).is_ok())
                }
            };
            listener.delivered = true;
            if !delivered {
                log::warn!("listener {id} is closed; dropping event");
            }
        }
    }

    /// Reports a failure to observe the result of a write to every listener
    /// at `paths`.
    pub(crate) fn dispatch_error(&self, paths: &[Vec<String>], error: &DatabaseAdapterError) {
        let listeners = self.listeners.lock().unwrap();
        for (id, listener) in listeners.iter().filter(|(_, l)| paths.contains(&l.path)) {
            let delivered = match &listener.sink {
                ListenerSink::Value(sender) => sender.try_send(Err(error.clone())).is_ok(),
                ListenerSink::Child(_, sender) => sender.try_send(Err(error.clone())).is_ok(),
            };
            if !delivered {
                log::warn!("listener {id} is closed; dropping error");
            }
        }
    }
}

/// Child events of `kind` that turn `old` into `new`, in key order.
pub(crate) fn child_events(kind: ChildEventKind, old: &Value, new: &Value) -> Vec<ChildEvent> {
    let old_children = ordered_children(old).unwrap_or_default();
    let new_children = ordered_children(new).unwrap_or_default();
    let old_map: BTreeMap<&str, &Value> = old_children
        .iter()
        .map(|(key, value)| (key.as_str(), value))
        .collect();
    let new_map: BTreeMap<&str, &Value> = new_children
        .iter()
        .map(|(key, value)| (key.as_str(), value))
        .collect();

    let source = match kind {
        ChildEventKind::Added | ChildEventKind::Changed => &new_children,
        ChildEventKind::Removed => &old_children,
    };
    let ordered_keys: Vec<&str> = source.iter().map(|(key, _)| key.as_str()).collect();

    source
        .iter()
        .filter(|(key, value)| match kind {
            ChildEventKind::Added => !old_map.contains_key(key.as_str()),
            ChildEventKind::Changed => old_map
                .get(key.as_str())
                .is_some_and(|old_value| *old_value != value),
            ChildEventKind::Removed => !new_map.contains_key(key.as_str()),
        })
        .map(|(key, value)| ChildEvent {
            kind,
            node: Node::from_value(Some(key), value.clone()),
            previous_key: previous_key(&ordered_keys, key),
        })
        .collect()
}
