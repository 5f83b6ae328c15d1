//! Single-flight coalescing of materializations.
//!
//! At most one flight exists per target key. The first caller to register
//! a key becomes the leader and receives a [`FlightTicket`] that it hands
//! to the detached task doing the work. Every caller, leader included,
//! receives a [`Waiter`] that resolves when the ticket completes.
//!
//! # Interest tracking
//!
//! Each waiter carries an interest guard. When the last guard for a flight
//! is dropped (every caller gave up or timed out) the flight's
//! [`CancellationToken`] fires, which kills the engine process and lets the
//! flight task unwind. A later request for the same key finds the cancelled
//! flight and replaces it with a fresh one.
//!
//! ```text
//! register(key) ──► Leader { waiter, ticket }   (new flight)
//!              └──► Follower { waiter }         (joined flight)
//!
//! ticket.complete(result) ──► every waiter.wait() yields result
//! last waiter dropped     ──► flight token cancelled
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Resolution;

/// Outcome shared with every waiter of a flight.
pub type FlightResult = GatewayResult<Resolution>;

struct Flight {
    id: u64,
    tx: broadcast::Sender<FlightResult>,
    interest: usize,
    cancel: CancellationToken,
}

/// Result of registering interest in a key.
pub enum CoalesceResult {
    /// No flight was running; the caller must drive the ticket to completion.
    Leader { waiter: Waiter, ticket: FlightTicket },
    /// A flight is already running; wait for its result.
    Follower { waiter: Waiter },
}

/// Snapshot of coalescer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub in_flight: usize,
    pub flights_started: u64,
    pub requests_coalesced: u64,
}

/// Per-key single-flight table.
#[derive(Default)]
pub struct RequestCoalescer {
    flights: DashMap<String, Flight>,
    next_id: AtomicU64,
    flights_started: AtomicU64,
    requests_coalesced: AtomicU64,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`.
    pub fn register(self: &Arc<Self>, key: &str) -> CoalesceResult {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(mut entry) if !entry.get().cancel.is_cancelled() => {
                let flight = entry.get_mut();
                flight.interest += 1;
                let waiter = Waiter {
                    rx: flight.tx.subscribe(),
                    _guard: InterestGuard {
                        coalescer: Arc::clone(self),
                        key: key.to_string(),
                        flight_id: flight.id,
                    },
                };
                drop(entry);

                self.requests_coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Request coalesced onto in-flight materialization");
                CoalesceResult::Follower { waiter }
            }
            entry => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = broadcast::channel(1);
                let cancel = CancellationToken::new();
                let flight = Flight {
                    id,
                    tx: tx.clone(),
                    interest: 1,
                    cancel: cancel.clone(),
                };
                match entry {
                    Entry::Occupied(mut stale) => {
                        debug!(key = %key, "Replacing cancelled flight");
                        stale.insert(flight);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(flight);
                    }
                }

                self.flights_started.fetch_add(1, Ordering::Relaxed);
                let waiter = Waiter {
                    rx,
                    _guard: InterestGuard {
                        coalescer: Arc::clone(self),
                        key: key.to_string(),
                        flight_id: id,
                    },
                };
                let ticket = FlightTicket {
                    coalescer: Arc::clone(self),
                    key: key.to_string(),
                    flight_id: id,
                    tx,
                    cancel,
                    completed: false,
                };
                CoalesceResult::Leader { waiter, ticket }
            }
        }
    }

    /// Number of flights currently registered.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            in_flight: self.in_flight(),
            flights_started: self.flights_started.load(Ordering::Relaxed),
            requests_coalesced: self.requests_coalesced.load(Ordering::Relaxed),
        }
    }

    fn remove_flight(&self, key: &str, flight_id: u64) {
        self.flights.remove_if(key, |_, flight| flight.id == flight_id);
    }

    fn release_interest(&self, key: &str, flight_id: u64) {
        if let Some(mut flight) = self.flights.get_mut(key) {
            if flight.id != flight_id {
                return;
            }
            flight.interest = flight.interest.saturating_sub(1);
            if flight.interest == 0 && !flight.cancel.is_cancelled() {
                debug!(key = %key, "Last waiter gone, cancelling flight");
                flight.cancel.cancel();
            }
        }
    }
}

/// Receives the result of one flight.
pub struct Waiter {
    rx: broadcast::Receiver<FlightResult>,
    _guard: InterestGuard,
}

impl Waiter {
    /// Wait for the flight to finish.
    ///
    /// A flight that ends without publishing a result (its task was dropped)
    /// yields [`GatewayError::Cancelled`].
    pub async fn wait(mut self) -> FlightResult {
        match self.rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Cancelled),
        }
    }
}

struct InterestGuard {
    coalescer: Arc<RequestCoalescer>,
    key: String,
    flight_id: u64,
}

impl Drop for InterestGuard {
    fn drop(&mut self) {
        self.coalescer.release_interest(&self.key, self.flight_id);
    }
}

/// Leader's handle on a flight.
///
/// Dropping the ticket without calling [`complete`](Self::complete)
/// removes the flight and wakes every waiter with `Cancelled`.
pub struct FlightTicket {
    coalescer: Arc<RequestCoalescer>,
    key: String,
    flight_id: u64,
    tx: broadcast::Sender<FlightResult>,
    cancel: CancellationToken,
    completed: bool,
}

impl FlightTicket {
    /// Token cancelled once no caller is waiting on this flight.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Publish the flight's result to every waiter and retire the flight.
    pub fn complete(mut self, result: FlightResult) {
        // Remove first so no new follower subscribes after the send
        self.coalescer.remove_flight(&self.key, self.flight_id);
        let _ = self.tx.send(result);
        self.completed = true;
    }
}

impl Drop for FlightTicket {
    fn drop(&mut self) {
        if !self.completed {
            self.coalescer.remove_flight(&self.key, self.flight_id);
        }
    }
}
