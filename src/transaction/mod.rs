//! Transaction Registry Module
//!
//! ECHONET Lite correlates a response with its request by the 16-bit
//! transaction ID (TID) alone. The registry is the table of in-flight
//! transactions of one request engine and the single place inbound
//! datagrams are demultiplexed.
//!
//! Each entry owns a one-shot completion. An entry leaves the table exactly
//! once, through whichever of [`TransactionRegistry::dispatch`] (matching
//! response), [`TransactionRegistry::expire`] (deadline) or
//! [`TransactionRegistry::close`] (engine teardown) takes it first; the
//! others find nothing and do nothing. The lock is only held for table
//! updates, never while a completion is delivered or awaited.
//!
//! # Collision policy
//!
//! TIDs wrap after 65535. [`TransactionRegistry::register_next`] skips IDs
//! that are still pending, and an explicit [`TransactionRegistry::register`]
//! of a pending ID is rejected with [`RegistryError::Collision`] instead of
//! replacing the waiting entry. TID 0 is never issued.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::frame::Frame;

/// Errors raised when registering a transaction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The TID is still pending
    #[error("transaction {0} is still pending")]
    Collision(u16),
    /// Every non-zero TID is pending
    #[error("all transaction IDs are in use")]
    Exhausted,
    /// The owning engine has shut down
    #[error("transaction registry is closed")]
    Closed,
}

/// A response routed to its transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub frame: Frame,
    pub source: SocketAddr,
    /// The datagram ended inside a property; `frame` holds the prefix
    pub truncated: bool,
}

/// How a transaction ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Response(Response),
    TimedOut,
    Closed,
}

struct Pending {
    completion: oneshot::Sender<Completion>,
    deadline: Instant,
}

struct RegistryState {
    pending: HashMap<u16, Pending>,
    next_tid: u16,
    closed: bool,
}

/// In-flight transactions of one request engine
pub struct TransactionRegistry {
    state: Mutex<RegistryState>,
}

impl TransactionRegistry {
    /// Create an empty registry issuing TIDs from 1
    pub fn new() -> Self {
        Self::with_initial_tid(1)
    }

    /// Create an empty registry whose first issued TID is `tid` (0 maps to 1)
    pub fn with_initial_tid(tid: u16) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                pending: HashMap::new(),
                next_tid: tid.max(1),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `tid` with its completion and deadline
    pub fn register(
        &self,
        tid: u16,
        completion: oneshot::Sender<Completion>,
        deadline: Instant,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RegistryError::Closed);
        }
        if state.pending.contains_key(&tid) {
            log::warn!("Rejecting registration of pending transaction {}", tid);
            return Err(RegistryError::Collision(tid));
        }
        state.pending.insert(
            tid,
            Pending {
                completion,
                deadline,
            },
        );
        Ok(())
    }

    /// Allocate the next free TID and register it
    pub fn register_next(
        &self,
        completion: oneshot::Sender<Completion>,
        deadline: Instant,
    ) -> Result<u16, RegistryError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RegistryError::Closed);
        }

        let mut candidate = state.next_tid;
        for _ in 0..u16::MAX {
            if !state.pending.contains_key(&candidate) {
                state.next_tid = next_nonzero(candidate);
                state.pending.insert(
                    candidate,
                    Pending {
                        completion,
                        deadline,
                    },
                );
                return Ok(candidate);
            }
            candidate = next_nonzero(candidate);
        }

        Err(RegistryError::Exhausted)
    }

    /// Complete `tid` with a response.
    ///
    /// Returns `false` for unknown, already completed or foreign TIDs; the
    /// datagram is then simply dropped.
    pub fn dispatch(&self, tid: u16, response: Response) -> bool {
        let entry = self.lock().pending.remove(&tid);
        match entry {
            Some(pending) => {
                if pending.completion.send(Completion::Response(response)).is_err() {
                    log::trace!("Transaction {} completed after its caller left", tid);
                }
                true
            }
            None => false,
        }
    }

    /// Complete `tid` with a timeout if it is still pending
    pub fn expire(&self, tid: u16) -> bool {
        let entry = self.lock().pending.remove(&tid);
        match entry {
            Some(pending) => {
                let _ = pending.completion.send(Completion::TimedOut);
                true
            }
            None => false,
        }
    }

    /// Remove `tid` without completing it (send failure, abandoned caller)
    pub fn retract(&self, tid: u16) -> bool {
        self.lock().pending.remove(&tid).is_some()
    }

    /// Expire every transaction whose deadline is at or before `now`
    pub fn expire_overdue(&self, now: Instant) -> Vec<u16> {
        let overdue: Vec<(u16, Pending)> = {
            let mut state = self.lock();
            let tids: Vec<u16> = state
                .pending
                .iter()
                .filter(|(_, pending)| pending.deadline <= now)
                .map(|(tid, _)| *tid)
                .collect();
            tids.into_iter()
                .filter_map(|tid| state.pending.remove(&tid).map(|p| (tid, p)))
                .collect()
        };

        overdue
            .into_iter()
            .map(|(tid, pending)| {
                let _ = pending.completion.send(Completion::TimedOut);
                tid
            })
            .collect()
    }

    /// Fail every pending transaction with [`Completion::Closed`] and refuse
    /// new registrations. Returns how many were pending.
    pub fn close(&self) -> usize {
        let drained: Vec<Pending> = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.drain().map(|(_, pending)| pending).collect()
        };
        let count = drained.len();
        for pending in drained {
            let _ = pending.completion.send(Completion::Closed);
        }
        count
    }

    /// Number of in-flight transactions
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether `tid` is in flight
    pub fn is_pending(&self, tid: u16) -> bool {
        self.lock().pending.contains_key(&tid)
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn next_nonzero(tid: u16) -> u16 {
    match tid.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}
