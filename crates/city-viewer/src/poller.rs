//! Rate-limited, single-flight polling of the world endpoint.
//!
//! The controller is the only writer of poll state. Fetches run on their own
//! tasks and report back over a channel; the owner of the controller applies
//! those completions from the same task that delivers ticks, so state never
//! changes from inside a fetch.

use crate::metrics::ViewerMetrics;
use crate::net::{FetchError, SnapshotSource};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use world_api::{GridDims, ParseError, WorldSnapshot};

/// Phase one of startup: fetch once and take the grid size from it.
///
/// Any failure here is fatal to the caller; nothing can be drawn without
/// knowing the grid.
pub async fn retrieve_grid_dims<S: SnapshotSource>(source: &S) -> Result<GridDims, FetchError> {
    let snapshot = source.fetch().await?;
    let dims = snapshot.dims();
    tracing::info!(
        width = dims.width,
        height = dims.height,
        customers = snapshot.customers.len(),
        cars = snapshot.cars.len(),
        "Retrieved city configuration"
    );
    Ok(dims)
}

/// What a tick decided about starting a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Start,
    /// A previous fetch has not completed yet.
    InFlight,
    /// The last attempt started less than one interval ago.
    RateLimited,
}

impl PollDecision {
    fn label(self) -> &'static str {
        match self {
            PollDecision::Start => "start",
            PollDecision::InFlight => "in_flight",
            PollDecision::RateLimited => "rate_limited",
        }
    }
}

/// Result of one finished fetch, as delivered back to the controller.
#[derive(Debug)]
pub struct FetchOutcome {
    pub started_at: Instant,
    pub result: Result<WorldSnapshot, FetchError>,
}

/// Effect of applying a [`FetchOutcome`].
#[derive(Debug)]
pub enum PollUpdate {
    Published(Arc<WorldSnapshot>),
    Rejected(FetchError),
}

/// Read side of the published snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotReader {
    rx: watch::Receiver<Option<Arc<WorldSnapshot>>>,
}

impl SnapshotReader {
    /// Latest successfully fetched snapshot, or `None` before the first one.
    pub fn latest(&self) -> Option<Arc<WorldSnapshot>> {
        self.rx.borrow().clone()
    }
}

/// Decides once per tick whether to poll and owns the published snapshot.
pub struct PollingController<S> {
    source: Arc<S>,
    dims: GridDims,
    interval: Duration,
    last_fetch_started: Option<Instant>,
    in_flight: bool,
    published: watch::Sender<Option<Arc<WorldSnapshot>>>,
    outcome_tx: mpsc::UnboundedSender<FetchOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    metrics: Arc<ViewerMetrics>,
}

impl<S: SnapshotSource> PollingController<S> {
    /// Phase two of startup. `dims` is the grid established by
    /// [`retrieve_grid_dims`]; snapshots of any other size are rejected.
    pub fn new(
        source: Arc<S>,
        dims: GridDims,
        interval: Duration,
        metrics: Arc<ViewerMetrics>,
    ) -> Self {
        let (published, _) = watch::channel(None);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            source,
            dims,
            interval,
            last_fetch_started: None,
            in_flight: false,
            published,
            outcome_tx,
            outcome_rx,
            metrics,
        }
    }

    pub fn subscribe(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.published.subscribe(),
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn last_fetch_started(&self) -> Option<Instant> {
        self.last_fetch_started
    }

    pub fn latest(&self) -> Option<Arc<WorldSnapshot>> {
        self.published.borrow().clone()
    }

    /// Rate limit first, then the in-flight guard; either one blocks a fetch.
    pub fn poll_decision(&self, now: Instant) -> PollDecision {
        if let Some(started) = self.last_fetch_started {
            if now.saturating_duration_since(started) < self.interval {
                return PollDecision::RateLimited;
            }
        }
        if self.in_flight {
            return PollDecision::InFlight;
        }
        PollDecision::Start
    }

    pub fn should_poll(&self, now: Instant) -> bool {
        self.poll_decision(now) == PollDecision::Start
    }

    /// Called once per frame. Applies completions that already arrived, then
    /// starts a fetch if one is due. Never waits on the network.
    pub fn on_tick(&mut self, now: Instant) -> PollDecision {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.apply(outcome);
        }

        let decision = self.poll_decision(now);
        if decision == PollDecision::Start {
            self.start_fetch(now);
        } else {
            self.metrics
                .ticks_skipped_total
                .with_label_values(&[decision.label()])
                .inc();
        }
        decision
    }

    fn start_fetch(&mut self, now: Instant) {
        // Both fields are set before the fetch task exists, so no later tick
        // can observe an idle controller while this fetch is pending.
        self.last_fetch_started = Some(now);
        self.in_flight = true;
        self.metrics.polls_started_total.inc();

        let fetch = self.source.fetch();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            // The receiver lives as long as the controller.
            let _ = tx.send(FetchOutcome {
                started_at: now,
                result,
            });
        });
    }

    /// Waits for the pending fetch to complete. Pair with [`Self::apply`].
    pub async fn next_outcome(&mut self) -> Option<FetchOutcome> {
        self.outcome_rx.recv().await
    }

    /// Waits for the pending fetch and applies it.
    pub async fn settle(&mut self) -> Option<PollUpdate> {
        let outcome = self.next_outcome().await?;
        Some(self.apply(outcome))
    }

    /// Folds a completed fetch into the controller state.
    pub fn apply(&mut self, outcome: FetchOutcome) -> PollUpdate {
        let elapsed = Instant::now().saturating_duration_since(outcome.started_at);
        self.metrics
            .fetch_duration_seconds
            .observe(elapsed.as_secs_f64());

        let checked = outcome.result.and_then(|snapshot| {
            snapshot
                .ensure_dims(self.dims)
                .map_err(|e| FetchError::from(ParseError::from(e)))?;
            Ok(snapshot)
        });

        let update = match checked {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.metrics
                    .record_snapshot(snapshot.customers.len(), snapshot.cars.len());
                self.metrics.polls_succeeded_total.inc();
                self.published.send_replace(Some(snapshot.clone()));
                tracing::debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    customers = snapshot.customers.len(),
                    cars = snapshot.cars.len(),
                    "Published world snapshot"
                );
                PollUpdate::Published(snapshot)
            }
            Err(error) => {
                self.metrics
                    .polls_failed_total
                    .with_label_values(&[error.kind()])
                    .inc();
                tracing::warn!(
                    error = %error,
                    kind = error.kind(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "World update failed; keeping previous snapshot"
                );
                PollUpdate::Rejected(error)
            }
        };

        self.in_flight = false;
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt};
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Reply = Result<WorldSnapshot, FetchError>;

    /// Source whose fetches stay pending until the test answers them.
    #[derive(Default)]
    struct ScriptedSource {
        pending: Mutex<VecDeque<oneshot::Sender<Reply>>>,
    }

    impl ScriptedSource {
        fn requests(&self) -> usize {
            self.pending.lock().unwrap().len()
        }

        fn answer(&self, reply: Reply) {
            let tx = self
                .pending
                .lock()
                .unwrap()
                .pop_front()
                .expect("no fetch is waiting for an answer");
            tx.send(reply).expect("fetch future was dropped");
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn fetch(&self) -> BoxFuture<'static, Reply> {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().push_back(tx);
            async move { rx.await.expect("test dropped the responder") }.boxed()
        }
    }

    fn open_city(width: u32, height: u32) -> WorldSnapshot {
        WorldSnapshot {
            width,
            height,
            grid: vec![true; (width * height) as usize],
            customers: BTreeMap::new(),
            cars: BTreeMap::new(),
            teams: BTreeMap::new(),
        }
    }

    fn parse_failure() -> FetchError {
        let err = serde_json::from_str::<serde_json::Value>("{\"width\":").unwrap_err();
        FetchError::from(ParseError::from(err))
    }

    fn controller(
        interval_ms: u64,
    ) -> (PollingController<ScriptedSource>, Arc<ScriptedSource>, Arc<ViewerMetrics>) {
        let source = Arc::new(ScriptedSource::default());
        let metrics = Arc::new(ViewerMetrics::new().unwrap());
        let controller = PollingController::new(
            source.clone(),
            GridDims::new(3, 3),
            Duration::from_millis(interval_ms),
            metrics.clone(),
        );
        (controller, source, metrics)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test]
    async fn rate_limit_and_in_flight_guard_follow_the_tick_sequence() {
        let (mut poller, source, _) = controller(1000);
        let t0 = Instant::now();

        assert_eq!(poller.on_tick(t0), PollDecision::Start);
        assert!(poller.is_in_flight());
        assert_eq!(poller.on_tick(t0 + ms(500)), PollDecision::RateLimited);
        assert!(!poller.should_poll(t0 + ms(500)));
        assert_eq!(poller.on_tick(t0 + ms(1000)), PollDecision::InFlight);
        assert_eq!(source.requests(), 1);

        source.answer(Ok(open_city(3, 3)));
        assert!(matches!(poller.settle().await, Some(PollUpdate::Published(_))));
        assert!(!poller.is_in_flight());

        assert_eq!(poller.on_tick(t0 + ms(1001)), PollDecision::Start);
        assert_eq!(poller.last_fetch_started(), Some(t0 + ms(1001)));
        assert_eq!(source.requests(), 1);
    }

    #[tokio::test]
    async fn interval_is_measured_from_attempt_start() {
        let (mut poller, source, _) = controller(1000);
        let t0 = Instant::now();

        poller.on_tick(t0);
        source.answer(Ok(open_city(3, 3)));
        poller.settle().await;

        // Completed quickly, but the next attempt still waits a full interval.
        assert_eq!(poller.poll_decision(t0 + ms(999)), PollDecision::RateLimited);
        assert_eq!(poller.on_tick(t0 + ms(999)), PollDecision::RateLimited);
        assert_eq!(poller.on_tick(t0 + ms(1000)), PollDecision::Start);
    }

    #[tokio::test]
    async fn at_most_one_fetch_is_ever_pending() {
        let (mut poller, source, metrics) = controller(10);
        let t0 = Instant::now();

        for step in 0..50 {
            poller.on_tick(t0 + ms(step * 20));
        }
        assert_eq!(source.requests(), 1);
        assert_eq!(metrics.polls_started_total.get(), 1);
        assert_eq!(
            metrics
                .ticks_skipped_total
                .with_label_values(&["in_flight"])
                .get(),
            49
        );
    }

    #[tokio::test]
    async fn parse_failure_keeps_snapshot_and_allows_retry() {
        let (mut poller, source, metrics) = controller(1000);
        let reader = poller.subscribe();
        let t0 = Instant::now();

        poller.on_tick(t0);
        let mut first = open_city(3, 3);
        first.cars.insert("1".into(), world_api::Car { position: 4, team_id: 0 });
        source.answer(Ok(first.clone()));
        poller.settle().await;
        assert_eq!(reader.latest().as_deref(), Some(&first));

        assert_eq!(poller.on_tick(t0 + ms(1000)), PollDecision::Start);
        source.answer(Err(parse_failure()));
        let update = poller.settle().await;
        assert!(matches!(update, Some(PollUpdate::Rejected(ref e)) if e.kind() == "malformed"));

        assert!(!poller.is_in_flight());
        assert_eq!(reader.latest().as_deref(), Some(&first));
        assert_eq!(
            metrics.polls_failed_total.with_label_values(&["malformed"]).get(),
            1
        );

        assert_eq!(poller.on_tick(t0 + ms(1500)), PollDecision::RateLimited);
        assert_eq!(poller.on_tick(t0 + ms(2000)), PollDecision::Start);
    }

    #[tokio::test]
    async fn failure_before_first_snapshot_leaves_nothing_published() {
        let (mut poller, source, _) = controller(1000);
        poller.on_tick(Instant::now());
        source.answer(Err(FetchError::from(ParseError::MissingField("grid"))));
        poller.settle().await;
        assert!(poller.latest().is_none());
        assert!(poller.subscribe().latest().is_none());
    }

    #[tokio::test]
    async fn resized_world_is_rejected() {
        let (mut poller, source, metrics) = controller(1000);
        let t0 = Instant::now();

        poller.on_tick(t0);
        source.answer(Ok(open_city(3, 3)));
        poller.settle().await;
        let before = poller.latest();

        poller.on_tick(t0 + ms(1000));
        source.answer(Ok(open_city(4, 4)));
        let update = poller.settle().await;
        assert!(
            matches!(update, Some(PollUpdate::Rejected(ref e)) if e.kind() == "dimensions_changed")
        );
        assert_eq!(poller.latest(), before);
        assert_eq!(poller.dims(), GridDims::new(3, 3));
        assert_eq!(
            metrics
                .polls_failed_total
                .with_label_values(&["dimensions_changed"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn completions_are_applied_on_the_next_tick() {
        let (mut poller, source, _) = controller(100);
        let reader = poller.subscribe();
        let t0 = Instant::now();

        poller.on_tick(t0);
        source.answer(Ok(open_city(3, 3)));
        // Let the fetch task deliver its outcome without awaiting it directly.
        while poller.outcome_rx.is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(poller.is_in_flight());

        assert_eq!(poller.on_tick(t0 + ms(100)), PollDecision::Start);
        assert!(reader.latest().is_some());
    }

    #[tokio::test]
    async fn bootstrap_reads_dims_from_a_single_fetch() {
        let source = ScriptedSource::default();
        let fetch = retrieve_grid_dims(&source);
        tokio::pin!(fetch);

        // Drive the future until the request is registered, then answer it.
        assert!(futures::poll!(fetch.as_mut()).is_pending());
        source.answer(Ok(open_city(5, 4)));
        assert_eq!(fetch.await.unwrap(), GridDims::new(5, 4));
    }

    #[tokio::test]
    async fn bootstrap_failure_is_returned_to_the_caller() {
        let source = ScriptedSource::default();
        let fetch = retrieve_grid_dims(&source);
        tokio::pin!(fetch);

        assert!(futures::poll!(fetch.as_mut()).is_pending());
        source.answer(Err(FetchError::from(ParseError::MissingField("width"))));
        assert_eq!(fetch.await.unwrap_err().kind(), "missing_field");
    }
}
