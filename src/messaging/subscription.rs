use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_channel::Sender;

use crate::util::subscribe::listener_channel;
use crate::util::Subscription;

/// Fan-out of one kind of event to every live stream.
pub(crate) struct ListenerSet<T> {
    name: &'static str,
    senders: Mutex<BTreeMap<u64, Sender<T>>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + 'static> ListenerSet<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            senders: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(self: &Arc<Self>) -> Subscription<T> {
        let (sender, receiver) = listener_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.senders.lock().unwrap().insert(id, sender);
        log::debug!("registered {} listener {id}", self.name);
        let listeners = Arc::clone(self);
        Subscription::new(receiver, Box::new(move || listeners.remove(id)))
    }

    fn remove(&self, id: u64) {
        if self.senders.lock().unwrap().remove(&id).is_some() {
            log::debug!("removed {} listener {id}", self.name);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    /// Sends `value` to every stream; returns how many received it.
    pub(crate) fn broadcast(&self, value: &T) -> usize {
        let senders = self.senders.lock().unwrap();
        let mut delivered = 0;
        for (id, sender) in senders.iter() {
            if sender.try_send(value.clone()).is_ok() {
                delivered += 1;
            } else {
                log::warn!("{} listener {id} is closed; dropping event", self.name);
            }
        }
        delivered
    }
}
