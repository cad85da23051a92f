//! Alert emission.
//!
//! Actionable assessments are pushed to every registered `AlertSink`.
//! Delivery is at-least-once: the same window may be re-evaluated and
//! re-emitted, so receivers dedupe on `assessment_id` (see
//! `AlertDeduplicator`).

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{RiskError, RiskResult};
use crate::scorer::RiskAssessment;

/// Receiver of actionable risk assessments.
///
/// Implementations must not block: `deliver` is called on the evaluation path.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, assessment: &RiskAssessment) -> RiskResult<()>;

    /// Retry anything held back earlier. Returns how many were handed over.
    fn flush(&self) -> RiskResult<usize> {
        Ok(0)
    }
}

/// Sink backed by a bounded tokio channel.
///
/// When the receiver lags, assessments wait in a backlog of the same
/// capacity and go out, in order, on the next `deliver` or `flush`. Only
/// when the backlog itself is full is the oldest waiting assessment dropped.
#[derive(Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::Sender<RiskAssessment>,
    backlog: Arc<Mutex<VecDeque<RiskAssessment>>>,
    backlog_capacity: usize,
}

impl ChannelAlertSink {
    /// Create a sink and the receiver end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RiskAssessment>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let sink = Self {
            tx,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            backlog_capacity: capacity,
        };
        (sink, rx)
    }

    /// Number of assessments waiting for channel space.
    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().len()
    }

    /// Move backlog entries into the channel until it fills up.
    fn drain(&self, backlog: &mut VecDeque<RiskAssessment>) -> RiskResult<usize> {
        let mut sent = 0;
        while let Some(next) = backlog.pop_front() {
            match self.tx.try_send(next) {
                Ok(()) => sent += 1,
                Err(mpsc::error::TrySendError::Full(next)) => {
                    backlog.push_front(next);
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    backlog.clear();
                    return Err(RiskError::AlertChannelClosed);
                }
            }
        }
        Ok(sent)
    }
}

impl AlertSink for ChannelAlertSink {
    fn deliver(&self, assessment: &RiskAssessment) -> RiskResult<()> {
        let mut backlog = self.backlog.lock();
        self.drain(&mut backlog)?;
        let waiting = if backlog.is_empty() {
            match self.tx.try_send(assessment.clone()) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(a)) => a,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(RiskError::AlertChannelClosed)
                }
            }
        } else {
            assessment.clone()
        };

        let dropped = if backlog.len() >= self.backlog_capacity {
            backlog.pop_front()
        } else {
            None
        };
        backlog.push_back(waiting);
        match dropped {
            Some(old) => Err(RiskError::AlertBackpressure(old.assessment_id)),
            None => {
                debug!(
                    id = %assessment.assessment_id,
                    backlog = backlog.len(),
                    "Alert channel full, holding assessment"
                );
                Ok(())
            }
        }
    }

    fn flush(&self) -> RiskResult<usize> {
        let mut backlog = self.backlog.lock();
        self.drain(&mut backlog)
    }
}

/// Fans actionable assessments out to registered sinks.
#[derive(Default)]
pub struct AlertEmitter {
    sinks: RwLock<Vec<Arc<dyn AlertSink>>>,
}

impl AlertEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn AlertSink>) {
        self.sinks.write().push(sink);
    }

    /// Drop sinks whose channel has closed.
    ///
    /// Matches by identity: the list may have changed since `closed` was
    /// collected, and another emit may already have pruned some of them.
    fn prune_closed(&self, closed: &[Arc<dyn AlertSink>]) {
        if closed.is_empty() {
            return;
        }
        self.sinks
            .write()
            .retain(|sink| !closed.iter().any(|c| same_sink(c, sink)));
    }

    /// Push an assessment to every sink if it recommends an action.
    ///
    /// Returns the number of sinks that accepted it. Sink failures are logged
    /// and never propagate into the evaluation path.
    pub fn emit(&self, assessment: &RiskAssessment) -> usize {
        if !assessment.recommended_action.is_actionable() {
            return 0;
        }
        let sinks: Vec<Arc<dyn AlertSink>> = self.sinks.read().clone();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for sink in &sinks {
            match sink.deliver(assessment) {
                Ok(()) => delivered += 1,
                Err(RiskError::AlertChannelClosed) => {
                    debug!(id = %assessment.assessment_id, "Alert sink closed, removing");
                    closed.push(Arc::clone(sink));
                }
                Err(e) => warn!(
                    id = %assessment.assessment_id,
                    error = %e,
                    "Alert delivery failed"
                ),
            }
        }
        self.prune_closed(&closed);
        delivered
    }

    /// Retry held-back deliveries on every sink. Returns how many went out.
    pub fn flush(&self) -> usize {
        let sinks: Vec<Arc<dyn AlertSink>> = self.sinks.read().clone();
        let mut flushed = 0;
        let mut closed = Vec::new();
        for sink in &sinks {
            match sink.flush() {
                Ok(n) => flushed += n,
                Err(RiskError::AlertChannelClosed) => closed.push(Arc::clone(sink)),
                Err(e) => warn!(error = %e, "Alert flush failed"),
            }
        }
        self.prune_closed(&closed);
        flushed
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }
}

fn same_sink(a: &Arc<dyn AlertSink>, b: &Arc<dyn AlertSink>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Receiver-side idempotency filter over the most recent assessment ids.
pub struct AlertDeduplicator {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl AlertDeduplicator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// `true` the first time an assessment id is seen, `false` for duplicates.
    pub fn observe(&mut self, assessment: &RiskAssessment) -> bool {
        let id = &assessment.assessment_id;
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push_back(id.clone());
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::{RecommendedAction, ScoreBreakdown};
    use chrono::{TimeZone, Utc};
    use sentinel_core::AssetId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn assessment(ms: i64, action: RecommendedAction) -> RiskAssessment {
        let asset = AssetId::new("cUSD").unwrap();
        let ts = Utc.timestamp_millis_opt(ms).unwrap();
        RiskAssessment {
            assessment_id: RiskAssessment::identity(&asset, ts),
            asset,
            risk_score: 0.9,
            matched_patterns: vec![],
            max_severity: None,
            recommended_action: action,
            breakdown: ScoreBreakdown::default(),
            timestamp: ts,
        }
    }

    #[derive(Default)]
    struct CountingSink {
        hits: AtomicUsize,
    }

    impl AlertSink for CountingSink {
        fn deliver(&self, _assessment: &RiskAssessment) -> RiskResult<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_non_actionable_not_emitted() {
        let emitter = AlertEmitter::new();
        let sink = Arc::new(CountingSink::default());
        emitter.register(sink.clone());

        assert_eq!(emitter.emit(&assessment(1, RecommendedAction::None)), 0);
        assert_eq!(emitter.emit(&assessment(1, RecommendedAction::Alert)), 1);
        assert_eq!(sink.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let emitter = AlertEmitter::new();
        let (sink, mut rx) = ChannelAlertSink::channel(4);
        emitter.register(Arc::new(sink));

        emitter.emit(&assessment(7, RecommendedAction::CircuitBreaker));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.assessment_id, "cUSD:7");
    }

    #[test]
    fn test_full_channel_holds_assessment_until_space() {
        let (sink, mut rx) = ChannelAlertSink::channel(1);
        sink.deliver(&assessment(1, RecommendedAction::Alert)).unwrap();
        sink.deliver(&assessment(2, RecommendedAction::Alert)).unwrap();
        assert_eq!(sink.backlog_len(), 1);

        assert_eq!(rx.try_recv().unwrap().assessment_id, "cUSD:1");
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.flush().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap().assessment_id, "cUSD:2");
        assert_eq!(sink.backlog_len(), 0);
    }

    #[test]
    fn test_backlog_preserves_order_on_next_delivery() {
        let (sink, mut rx) = ChannelAlertSink::channel(1);
        sink.deliver(&assessment(1, RecommendedAction::Alert)).unwrap();
        sink.deliver(&assessment(2, RecommendedAction::Alert)).unwrap();
        assert_eq!(rx.try_recv().unwrap().assessment_id, "cUSD:1");

        sink.deliver(&assessment(3, RecommendedAction::Alert)).unwrap();
        assert_eq!(rx.try_recv().unwrap().assessment_id, "cUSD:2");
        sink.flush().unwrap();
        assert_eq!(rx.try_recv().unwrap().assessment_id, "cUSD:3");
    }

    #[test]
    fn test_full_backlog_drops_oldest() {
        let (sink, mut rx) = ChannelAlertSink::channel(1);
        sink.deliver(&assessment(1, RecommendedAction::Alert)).unwrap();
        sink.deliver(&assessment(2, RecommendedAction::Alert)).unwrap();
        let err = sink
            .deliver(&assessment(3, RecommendedAction::Alert))
            .unwrap_err();
        assert!(matches!(err, RiskError::AlertBackpressure(id) if id == "cUSD:2"));

        assert_eq!(rx.try_recv().unwrap().assessment_id, "cUSD:1");
        sink.flush().unwrap();
        assert_eq!(rx.try_recv().unwrap().assessment_id, "cUSD:3");
    }

    #[test]
    fn test_emitter_flush_releases_backlog() {
        let emitter = AlertEmitter::new();
        let (sink, mut rx) = ChannelAlertSink::channel(1);
        emitter.register(Arc::new(sink));

        assert_eq!(emitter.emit(&assessment(1, RecommendedAction::Alert)), 1);
        assert_eq!(emitter.emit(&assessment(2, RecommendedAction::Alert)), 1);
        rx.try_recv().unwrap();
        assert_eq!(emitter.flush(), 1);
        assert_eq!(rx.try_recv().unwrap().assessment_id, "cUSD:2");
    }

    #[test]
    fn test_closed_sink_removed() {
        let emitter = AlertEmitter::new();
        let (sink, rx) = ChannelAlertSink::channel(1);
        emitter.register(Arc::new(sink));
        drop(rx);

        assert_eq!(emitter.emit(&assessment(1, RecommendedAction::Alert)), 0);
        assert_eq!(emitter.sink_count(), 0);
    }

    struct ClosedSink;

    impl AlertSink for ClosedSink {
        fn deliver(&self, _assessment: &RiskAssessment) -> RiskResult<()> {
            Err(RiskError::AlertChannelClosed)
        }
    }

    #[test]
    fn test_concurrent_emits_prune_only_closed_sinks() {
        let emitter = Arc::new(AlertEmitter::new());
        emitter.register(Arc::new(ClosedSink));
        emitter.register(Arc::new(ClosedSink));
        let live = Arc::new(CountingSink::default());
        emitter.register(live.clone());
        let late = Arc::new(CountingSink::default());

        let barrier = Arc::new(std::sync::Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let emitter = emitter.clone();
                let barrier = barrier.clone();
                let late = late.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    if i == 0 {
                        emitter.register(late);
                    }
                    emitter.emit(&assessment(i, RecommendedAction::Alert));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(emitter.sink_count(), 2);
        assert_eq!(live.hits.load(Ordering::SeqCst), 4);
        assert_eq!(emitter.emit(&assessment(9, RecommendedAction::Alert)), 2);
        assert_eq!(live.hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_repeated_prune_keeps_live_sinks() {
        let emitter = AlertEmitter::new();
        let closed: Arc<dyn AlertSink> = Arc::new(ClosedSink);
        emitter.register(closed.clone());
        let live = Arc::new(CountingSink::default());
        emitter.register(live.clone());

        // A stale closed list, applied twice, must not remove the live sink.
        emitter.prune_closed(&[closed.clone()]);
        emitter.prune_closed(&[closed]);
        assert_eq!(emitter.sink_count(), 1);
        assert_eq!(emitter.emit(&assessment(1, RecommendedAction::Alert)), 1);
    }

    #[test]
    fn test_deduplicator_ignores_repeats() {
        let mut dedup = AlertDeduplicator::new(2);
        let a = assessment(1, RecommendedAction::Alert);
        assert!(dedup.observe(&a));
        assert!(!dedup.observe(&a.clone()));

        assert!(dedup.observe(&assessment(2, RecommendedAction::Alert)));
        assert!(dedup.observe(&assessment(3, RecommendedAction::Alert)));
        assert_eq!(dedup.len(), 2);
        // Oldest id fell out of the bounded window.
        assert!(dedup.observe(&a));
    }
}
