//! Depth pub/sub.
//!
//! Depth dispatch is immediate fan-out: the [`MarketDepth`] is built (and sorted) once per
//! update and every responder currently subscribed to the instrument is invoked with it.
//! Depth is a snapshot stream, so nothing is buffered for instruments with no subscriber.

use crate::books::{Level, MarketDepth};
use calendar_instrument::InstrumentId;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Receives depth updates for the instruments it is subscribed to.
pub trait DepthResponder: Send + Sync {
    fn tick(&self, instrument: &InstrumentId, depth: &MarketDepth);
}

/// Routes depth updates to [`DepthResponder`]s keyed by instrument id.
#[derive(Default)]
pub struct BookListener {
    subscribers: Mutex<FnvHashMap<InstrumentId, Vec<Arc<dyn DepthResponder>>>>,
}

impl std::fmt::Debug for BookListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers.lock();
        f.debug_struct("BookListener")
            .field(
                "subscribers",
                &subscribers
                    .iter()
                    .map(|(instrument, responders)| (instrument, responders.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn same_responder(a: &Arc<dyn DepthResponder>, b: &Arc<dyn DepthResponder>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl BookListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, instrument: InstrumentId, responder: Arc<dyn DepthResponder>) {
        let mut subscribers = self.subscribers.lock();
        let responders = subscribers.entry(instrument).or_default();
        if !responders.iter().any(|existing| same_responder(existing, &responder)) {
            responders.push(responder);
        }
    }

    /// Subscribe `responder` until the returned [`BookSubscription`] is dropped.
    pub fn subscribe_scoped(
        self: &Arc<Self>,
        instrument: InstrumentId,
        responder: Arc<dyn DepthResponder>,
    ) -> BookSubscription {
        self.subscribe(instrument.clone(), Arc::clone(&responder));
        BookSubscription {
            listener: Arc::clone(self),
            instrument,
            responder,
        }
    }

    pub fn unsubscribe(&self, instrument: &InstrumentId, responder: &Arc<dyn DepthResponder>) {
        let mut subscribers = self.subscribers.lock();
        if let Some(responders) = subscribers.get_mut(instrument) {
            responders.retain(|existing| !same_responder(existing, responder));
            if responders.is_empty() {
                subscribers.remove(instrument);
            }
        }
    }

    pub fn subscriber_count(&self, instrument: &InstrumentId) -> usize {
        self.subscribers
            .lock()
            .get(instrument)
            .map_or(0, Vec::len)
    }

    /// Build the [`MarketDepth`] for a raw update once and fan it out.
    pub fn on_depth<IterAsks, IterBids, L>(
        &self,
        instrument: &InstrumentId,
        asks: IterAsks,
        bids: IterBids,
        time: DateTime<Utc>,
    ) where
        IterAsks: IntoIterator<Item = L>,
        IterBids: IntoIterator<Item = L>,
        L: Into<Level>,
    {
        self.dispatch(instrument, &MarketDepth::new(time, asks, bids));
    }

    /// Invoke every responder currently subscribed to `instrument`.
    ///
    /// Responders run outside the registry lock, so they may subscribe or unsubscribe.
    pub fn dispatch(&self, instrument: &InstrumentId, depth: &MarketDepth) {
        let responders = match self.subscribers.lock().get(instrument) {
            Some(responders) => responders.clone(),
            None => return,
        };

        trace!(%instrument, subscribers = responders.len(), "dispatching depth");
        for responder in responders {
            responder.tick(instrument, depth);
        }
    }
}

/// Scoped depth subscription, unsubscribed on drop.
pub struct BookSubscription {
    listener: Arc<BookListener>,
    instrument: InstrumentId,
    responder: Arc<dyn DepthResponder>,
}

impl std::fmt::Debug for BookSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookSubscription")
            .field("instrument", &self.instrument)
            .finish()
    }
}

impl BookSubscription {
    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }
}

impl Drop for BookSubscription {
    fn drop(&mut self) {
        self.listener.unsubscribe(&self.instrument, &self.responder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct Recorder {
        ticks: Mutex<Vec<(InstrumentId, MarketDepth)>>,
    }

    impl DepthResponder for Recorder {
        fn tick(&self, instrument: &InstrumentId, depth: &MarketDepth) {
            self.ticks.lock().push((instrument.clone(), depth.clone()));
        }
    }

    fn dispatch(listener: &BookListener, instrument: &str) {
        listener.on_depth(
            &InstrumentId::from(instrument),
            [(dec!(101), dec!(1)), (dec!(100), dec!(1))],
            [(dec!(98), dec!(1)), (dec!(99), dec!(1))],
            Utc::now(),
        );
    }

    #[test]
    fn test_dispatch_fans_out_sorted_depth() {
        let listener = BookListener::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        listener.subscribe("A".into(), first.clone());
        listener.subscribe("A".into(), second.clone());
        listener.subscribe("B".into(), second.clone());

        dispatch(&listener, "A");
        dispatch(&listener, "C");

        assert_eq!(first.ticks.lock().len(), 1);
        assert_eq!(second.ticks.lock().len(), 1);
        let ticks = first.ticks.lock();
        let (instrument, depth) = &ticks[0];
        assert_eq!(instrument, &InstrumentId::from("A"));
        assert_eq!(depth.best_ask().map(|level| level.price), Some(dec!(100)));
        assert_eq!(depth.best_bid().map(|level| level.price), Some(dec!(99)));
    }

    #[test]
    fn test_duplicate_subscribe_dispatches_once() {
        let listener = BookListener::new();
        let recorder = Arc::new(Recorder::default());
        listener.subscribe("A".into(), recorder.clone());
        listener.subscribe("A".into(), recorder.clone());

        dispatch(&listener, "A");
        assert_eq!(recorder.ticks.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let listener = BookListener::new();
        let recorder = Arc::new(Recorder::default());
        let responder: Arc<dyn DepthResponder> = recorder.clone();
        listener.subscribe("A".into(), responder.clone());
        listener.unsubscribe(&"A".into(), &responder);

        dispatch(&listener, "A");
        assert!(recorder.ticks.lock().is_empty());
        assert_eq!(listener.subscriber_count(&"A".into()), 0);
    }

    #[test]
    fn test_scoped_subscription_released_on_drop() {
        let listener = Arc::new(BookListener::new());
        let recorder = Arc::new(Recorder::default());

        {
            let _a = listener.subscribe_scoped("A".into(), recorder.clone());
            let _b = listener.subscribe_scoped("B".into(), recorder.clone());
            dispatch(&listener, "A");
            dispatch(&listener, "B");
        }
        dispatch(&listener, "A");
        dispatch(&listener, "B");

        assert_eq!(recorder.ticks.lock().len(), 2);
        assert_eq!(listener.subscriber_count(&"A".into()), 0);
        assert_eq!(listener.subscriber_count(&"B".into()), 0);
    }
}
