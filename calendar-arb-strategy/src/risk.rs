//! Risk gate for opening new transactions.
//!
//! Consulted before every launch: refuses while the margin cooldown is active, while the
//! maximum number of concurrent transactions is live, or while another transaction holds
//! the same instruments (in either direction).

use calendar_execution::Cooldown;
use calendar_instrument::{InstrumentId, InstrumentPair};
use fnv::FnvHashSet;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::debug;

/// Reason a new transaction was refused.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RiskRefused {
    #[error("margin cooldown active for {0:?}")]
    Cooldown(Duration),

    #[error("maximum concurrent transactions reached: {0}")]
    MaxConcurrent(usize),

    #[error("transaction already live on {0}")]
    PairActive(InstrumentPair),
}

/// Approves or refuses new transactions.
#[derive(Debug)]
pub struct RiskGate {
    cooldown: Cooldown,
    max_concurrent: usize,
    active: Mutex<FnvHashSet<(InstrumentId, InstrumentId)>>,
}

impl RiskGate {
    pub fn new(cooldown: Cooldown, max_concurrent: usize) -> Self {
        Self {
            cooldown,
            max_concurrent,
            active: Mutex::new(FnvHashSet::default()),
        }
    }

    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    /// Number of transactions currently holding a [`RiskPermit`].
    pub fn active(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether a transaction on `pair` would be approved right now.
    pub fn check(&self, pair: &InstrumentPair) -> Result<(), RiskRefused> {
        self.check_locked(&self.active.lock(), pair)
    }

    /// Approve a transaction on `pair`, holding its slot until the [`RiskPermit`] drops.
    pub fn acquire(self: &Arc<Self>, pair: &InstrumentPair) -> Result<RiskPermit, RiskRefused> {
        let mut active = self.active.lock();
        self.check_locked(&active, pair)?;

        let key = pair.unordered();
        active.insert(key.clone());
        debug!(%pair, active = active.len(), "risk approved");

        Ok(RiskPermit {
            gate: Arc::clone(self),
            key,
        })
    }

    fn check_locked(
        &self,
        active: &FnvHashSet<(InstrumentId, InstrumentId)>,
        pair: &InstrumentPair,
    ) -> Result<(), RiskRefused> {
        if let Some(remaining) = self.cooldown.remaining() {
            return Err(RiskRefused::Cooldown(remaining));
        }
        if active.contains(&pair.unordered()) {
            return Err(RiskRefused::PairActive(pair.clone()));
        }
        if active.len() >= self.max_concurrent {
            return Err(RiskRefused::MaxConcurrent(self.max_concurrent));
        }
        Ok(())
    }
}

/// Live transaction slot, released on drop.
#[derive(Debug)]
pub struct RiskPermit {
    gate: Arc<RiskGate>,
    key: (InstrumentId, InstrumentId),
}

impl Drop for RiskPermit {
    fn drop(&mut self) {
        self.gate.active.lock().remove(&self.key);
    }
}
