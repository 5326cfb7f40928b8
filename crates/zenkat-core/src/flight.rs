//! Request coalescing for crawls and hydrations.
//!
//! A [`FlightGroup`] runs at most one unit of work per key. The first caller
//! starts the work on a spawned task; later callers for the same key join the
//! flight and receive a clone of the same result. Because the work runs on
//! its own task, a caller that stops waiting (timeout, dropped future) never
//! cancels it for the others.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{Operation, Result, ZenkatError};

type Flights<K, T> = Arc<Mutex<HashMap<K, watch::Receiver<Option<T>>>>>;

/// Handle on an in-flight unit of work.
pub struct Flight<T> {
    rx: watch::Receiver<Option<T>>,
    leader: bool,
}

impl<T: Clone> Flight<T> {
    /// Whether this handle started the work.
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Result if the work has already finished.
    pub fn try_result(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the result.
    ///
    /// # Panics
    ///
    /// If the work panicked. The panic is re-raised in every waiter.
    pub async fn wait(mut self) -> T {
        let result = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        match result {
            Some(value) => value,
            None => panic!("coalesced work panicked before producing a result"),
        }
    }

    /// Wait at most `timeout`; `None` on expiry. The work keeps running.
    pub async fn wait_timeout(self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

/// How a caller waits on a load it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Wait up to `timeout`, then fail with `Timeout`.
    Block { timeout: Duration },
    /// Never wait; fail with `Pending` while the load runs.
    NoWait,
}

impl Wait {
    pub fn block(timeout: Duration) -> Self {
        Self::Block { timeout }
    }
}

/// Resolve a flight according to `wait`.
pub(crate) async fn settle<T: Clone>(
    flight: Flight<Result<T>>,
    wait: Wait,
    operation: Operation,
    key: &str,
) -> Result<T> {
    match wait {
        Wait::Block { timeout } => match flight.wait_timeout(timeout).await {
            Some(result) => result,
            None => Err(ZenkatError::timeout(operation, key)),
        },
        Wait::NoWait => flight
            .try_result()
            .unwrap_or_else(|| Err(ZenkatError::pending(operation, key))),
    }
}

/// Removes a key from the flight map when the work ends, even by panic.
struct Landing<K: Eq + Hash, T> {
    flights: Flights<K, T>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for Landing<K, T> {
    fn drop(&mut self) {
        self.flights.lock().remove(&self.key);
    }
}

/// Per-key singleflight coordinator.
pub struct FlightGroup<K, T> {
    flights: Flights<K, T>,
}

impl<K, T> Default for FlightGroup<K, T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> FlightGroup<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, starting `work` if none is running.
    ///
    /// `work` is only called when this caller becomes the leader. It must
    /// finish its side effects before returning: the key is released only
    /// after the future resolves.
    pub fn join_or_start<F, Fut>(&self, key: K, work: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut flights = self.flights.lock();
        if let Some(rx) = flights.get(&key) {
            return Flight {
                rx: rx.clone(),
                leader: false,
            };
        }

        let (tx, rx) = watch::channel(None);
        flights.insert(key.clone(), rx.clone());
        drop(flights);

        let landing = Landing {
            flights: Arc::clone(&self.flights),
            key,
        };
        let fut = work();
        tokio::spawn(async move {
            let result = fut.await;
            drop(landing);
            tx.send_replace(Some(result));
        });

        Flight { rx, leader: true }
    }

    /// Join the flight for `key` if one is running.
    pub fn join(&self, key: &K) -> Option<Flight<T>> {
        self.flights.lock().get(key).map(|rx| Flight {
            rx: rx.clone(),
            leader: false,
        })
    }

    pub fn in_flight(&self, key: &K) -> bool {
        self.flights.lock().contains_key(key)
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.flights.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
