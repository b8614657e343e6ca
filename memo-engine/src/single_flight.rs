//! In-process coalescing of concurrent identical requests.
//!
//! The first request for a key becomes the leader and registers a flight.
//! Requests for the same key that arrive while the flight is pending become
//! followers and wait for the leader's encoded result. The leader's
//! [`FlightGuard`] publishes the result on completion, or marks the flight
//! abandoned when dropped without completing (error, encode failure,
//! cancellation), and removes the flight from the table either way.
//!
//! A request that missed the store just before a flight for its key settled
//! finds no flight to join and leads a new one. [`InFlight::completions`]
//! lets it detect that case and read the store again before invoking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

/// State of one flight as seen by followers.
#[derive(Debug, Clone)]
pub(crate) enum FlightState {
    Pending,
    /// The leader's encoded result.
    Done(Arc<[u8]>),
    /// The leader finished without a shareable result.
    Abandoned,
}

impl FlightState {
    fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Outcome of joining the table for a key.
pub(crate) enum Join {
    Leader(FlightGuard),
    Follower(Follower),
}

struct Flight {
    id: u64,
    rx: watch::Receiver<FlightState>,
}

#[derive(Default)]
struct FlightTable {
    next_id: u64,
    flights: HashMap<String, Flight>,
}

/// Table of pending flights keyed by cache key.
#[derive(Clone, Default)]
pub(crate) struct InFlight {
    table: Arc<Mutex<FlightTable>>,
    completed: Arc<AtomicU64>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Lead a new flight for `key`, or follow the one already pending.
    pub(crate) fn join(&self, key: &str) -> Join {
        let mut table = lock(&self.table);

        if let Some(flight) = table.flights.get(key) {
            if !flight.rx.borrow().is_settled() {
                return Join::Follower(Follower {
                    rx: flight.rx.clone(),
                });
            }
        }

        let id = table.next_id;
        table.next_id = table.next_id.wrapping_add(1);

        let (tx, rx) = watch::channel(FlightState::Pending);
        table.flights.insert(key.to_string(), Flight { id, rx });

        Join::Leader(FlightGuard {
            key: key.to_string(),
            id,
            tx,
            table: Arc::clone(&self.table),
            completed: Arc::clone(&self.completed),
        })
    }

    /// Count of flights that have published a result.
    ///
    /// Incremented after the leader's write, so a reader that sees the same
    /// count before its store probe and after joining has not missed a write.
    pub(crate) fn completions(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of registered flights.
    pub(crate) fn len(&self) -> usize {
        lock(&self.table).flights.len()
    }
}

fn lock(table: &Mutex<FlightTable>) -> MutexGuard<'_, FlightTable> {
    // The table holds no invariants a panicking holder could break halfway.
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held by the leader of a flight for the duration of its request.
pub(crate) struct FlightGuard {
    key: String,
    id: u64,
    tx: watch::Sender<FlightState>,
    table: Arc<Mutex<FlightTable>>,
    completed: Arc<AtomicU64>,
}

impl FlightGuard {
    /// Publish the encoded result to every follower.
    pub(crate) fn complete(self, bytes: Arc<[u8]>) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.tx.send_replace(FlightState::Done(bytes));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        {
            let mut table = lock(&self.table);
            // A newer flight may already own the slot.
            if table.flights.get(&self.key).is_some_and(|f| f.id == self.id) {
                table.flights.remove(&self.key);
            }
        }

        self.tx.send_if_modified(|state| {
            if state.is_settled() {
                false
            } else {
                *state = FlightState::Abandoned;
                true
            }
        });
    }
}

/// A follower waiting on someone else's flight.
pub(crate) struct Follower {
    rx: watch::Receiver<FlightState>,
}

impl Follower {
    /// Wait for the leader to settle. `None` means there is nothing to share.
    pub(crate) async fn wait(mut self) -> Option<Arc<[u8]>> {
        let state = match self.rx.wait_for(FlightState::is_settled).await {
            Ok(state) => (*state).clone(),
            Err(_) => FlightState::Abandoned,
        };

        match state {
            FlightState::Done(bytes) => Some(bytes),
            FlightState::Pending | FlightState::Abandoned => None,
        }
    }
}
