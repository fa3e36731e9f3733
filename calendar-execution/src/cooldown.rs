//! Margin cooldown.
//!
//! Triggered when a placement is rejected for insufficient margin. While active, callers
//! refrain from opening new positions. The cooldown stores its deadline rather than a flag,
//! so it clears itself once the configured duration elapses.

use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{info, warn};

/// Shared, self-clearing cooldown signal.
#[derive(Debug, Clone)]
pub struct Cooldown {
    duration: Duration,
    until: Arc<Mutex<Option<Instant>>>,
}

impl Cooldown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: Arc::new(Mutex::new(None)),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start (or restart) the cooldown from now.
    pub fn trigger(&self) {
        let until = Instant::now() + self.duration;
        *self.until.lock() = Some(until);
        warn!(duration = ?self.duration, "cooldown triggered, opening suppressed");
    }

    /// Whether the cooldown is currently active.
    pub fn is_active(&self) -> bool {
        self.remaining().is_some()
    }

    /// Time until the cooldown clears, if active.
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut until = self.until.lock();
        match *until {
            Some(deadline) if deadline > now => Some(deadline - now),
            Some(_) => {
                *until = None;
                info!("cooldown cleared");
                None
            }
            None => None,
        }
    }
}
