use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

/// Outcome of waiting on a [`Settlement`].
///
/// Expiry is a value, not an error: the caller decides what a timeout means.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Wait<T> {
    Settled(T),
    TimedOut,
}

impl<T> Wait<T> {
    pub fn settled(self) -> Option<T> {
        match self {
            Wait::Settled(value) => Some(value),
            Wait::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Wait::TimedOut)
    }
}

/// Single-assignment, idempotent result cell shared between tasks.
///
/// The first [`Settlement::set`] is authoritative; later calls are no-ops. Any number of
/// tasks may [`Settlement::get`] concurrently, each observing the same settled value.
///
/// ```rust,ignore
/// let settlement = Settlement::new();
/// let waiter = settlement.clone();
/// tokio::spawn(async move { waiter.set(42) });
/// assert_eq!(settlement.get(None).await, Wait::Settled(42));
/// ```
#[derive(Debug)]
pub struct Settlement<T> {
    slot: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Settlement<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Settlement<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Settlement<T> {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Settle with `value`. Returns `true` if this call settled the cell, `false` if it was
    /// already settled (in which case `value` is discarded).
    pub fn set(&self, value: T) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                false
            } else {
                *slot = Some(value);
                true
            }
        })
    }

    pub fn is_settled(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl<T> Settlement<T>
where
    T: Clone,
{
    /// Settled value, if any, without waiting.
    pub fn peek(&self) -> Option<T> {
        self.slot.borrow().clone()
    }

    /// Wait for the cell to settle, bounded by `timeout` if provided.
    ///
    /// Returns immediately if already settled. `None` waits without bound.
    pub async fn get(&self, timeout: Option<Duration>) -> Wait<T> {
        let mut receiver = self.slot.subscribe();
        let settled = async move {
            receiver
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|value| value.clone())
        };

        let value = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, settled).await {
                Ok(value) => value,
                Err(_elapsed) => return Wait::TimedOut,
            },
            None => settled.await,
        };

        // The sender lives as long as self, so the receiver cannot observe a closed channel
        match value {
            Some(value) => Wait::Settled(value),
            None => Wait::TimedOut,
        }
    }
}
