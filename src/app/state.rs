use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_lock::RwLock;

/// Lifecycle of an adapter: `Uninitialized` until the first successful
/// `initialize`, `Ready` forever after.
pub enum AdapterState<C> {
    Uninitialized,
    Ready(Arc<C>),
}

impl<C> AdapterState<C> {
    pub fn is_ready(&self) -> bool {
        matches!(self, AdapterState::Ready(_))
    }

    pub fn connection(&self) -> Option<&Arc<C>> {
        match self {
            AdapterState::Ready(connection) => Some(connection),
            AdapterState::Uninitialized => None,
        }
    }
}

impl<C> Clone for AdapterState<C> {
    fn clone(&self) -> Self {
        match self {
            AdapterState::Uninitialized => AdapterState::Uninitialized,
            AdapterState::Ready(connection) => AdapterState::Ready(Arc::clone(connection)),
        }
    }
}

impl<C> fmt::Debug for AdapterState<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Uninitialized => f.write_str("Uninitialized"),
            AdapterState::Ready(_) => f.write_str("Ready"),
        }
    }
}

/// Holds an adapter's state behind an async lock.
///
/// `initialize_with` runs under the write lock so concurrent first use
/// connects once; every other caller only clones the `Arc` out.
pub(crate) struct StateCell<C> {
    state: RwLock<AdapterState<C>>,
}

impl<C> StateCell<C> {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(AdapterState::Uninitialized),
        }
    }

    pub(crate) async fn snapshot(&self) -> AdapterState<C> {
        self.state.read().await.clone()
    }

    pub(crate) async fn connection(&self) -> Option<Arc<C>> {
        self.state.read().await.connection().cloned()
    }

    /// Runs `connect` unless a connection already exists.
    ///
    /// Returns `Ok(true)` when this call established the connection and
    /// `Ok(false)` when it was skipped.
    pub(crate) async fn initialize_with<F, Fut, E>(&self, connect: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, E>>,
    {
        let mut state = self.state.write().await;
        if state.is_ready() {
            return Ok(false);
        }
        let connection = connect().await?;
        *state = AdapterState::Ready(Arc::new(connection));
        Ok(true)
    }
}

impl<C> Default for StateCell<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn initializes_once() {
        let cell: StateCell<usize> = StateCell::new();
        assert!(!cell.snapshot().await.is_ready());

        let connected = cell
            .initialize_with(|| async { Ok::<_, ()>(7) })
            .await
            .unwrap();
        assert!(connected);

        let connected = cell
            .initialize_with(|| async { Ok::<_, ()>(8) })
            .await
            .unwrap();
        assert!(!connected);
        assert_eq!(*cell.connection().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn failed_connect_leaves_state_uninitialized() {
        let cell: StateCell<usize> = StateCell::new();
        let result = cell
            .initialize_with(|| async { Err::<usize, _>("unreachable") })
            .await;
        assert_eq!(result, Err("unreachable"));
        assert!(cell.connection().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_initialize_connects_once() {
        let cell = Arc::new(StateCell::<usize>::new());
        let attempts = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cell = Arc::clone(&cell);
            let attempts = Arc::clone(&attempts);
            handles.push(tokio::spawn(async move {
                cell.initialize_with(|| async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok::<_, ()>(1)
                })
                .await
                .unwrap()
            }));
        }

        let mut connected = 0;
        for handle in handles {
            if handle.await.unwrap() {
                connected += 1;
            }
        }
        assert_eq!(connected, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
