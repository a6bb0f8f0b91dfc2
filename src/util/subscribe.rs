use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_channel::{Receiver, Sender};
use futures::Stream;

pub type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

/// Creates the sending half kept by a listener and the receiving half handed
/// to the caller. The channel is unbounded: events queue until drained.
pub(crate) fn listener_channel<T>() -> (Sender<T>, Receiver<T>) {
    async_channel::unbounded()
}

/// A lazy, non-restartable sequence of events from one backend listener.
///
/// Dropping the subscription (or calling [`Subscription::cancel`]) detaches
/// the listener; sibling subscriptions are unaffected.
pub struct Subscription<T> {
    receiver: Pin<Box<Receiver<T>>>,
    unsubscribe: Option<Unsubscribe>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(receiver: Receiver<T>, unsubscribe: Unsubscribe) -> Self {
        Self {
            receiver: Box::pin(receiver),
            unsubscribe: Some(unsubscribe),
        }
    }

    /// Detaches the listener. Events already queued are discarded.
    pub fn cancel(mut self) {
        self.detach();
    }

    /// Number of events delivered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    fn detach(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
        self.receiver.close();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.as_mut().poll_next(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("pending", &self.receiver.len())
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn delivers_in_send_order() {
        let (sender, receiver) = listener_channel();
        let mut subscription = Subscription::new(receiver, Box::new(|| {}));
        for value in 1..=3 {
            sender.try_send(value).unwrap();
        }
        assert_eq!(subscription.pending(), 3);
        assert_eq!(subscription.next().await, Some(1));
        assert_eq!(subscription.next().await, Some(2));
        assert_eq!(subscription.next().await, Some(3));
    }

    #[test]
    fn drop_runs_unsubscribe_and_closes_channel() {
        let detached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&detached);
        let (sender, receiver) = listener_channel::<u8>();
        let subscription = Subscription::new(
            receiver,
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        drop(subscription);

        assert!(detached.load(Ordering::SeqCst));
        assert!(sender.try_send(1).is_err());
    }
}
