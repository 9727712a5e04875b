// =============================================================================
// coordinator.rs - THE DISPATCHER
// =============================================================================
//
// Owns one scan from start to finish. The catalog goes into a FIFO queue,
// a fixed pool of worker tasks drains it through the prober, and every result
// is pushed to the caller's sink the moment it exists.
//
// Rules of the road:
//
//   - At most `concurrency_limit` probes are ever in flight. Each worker runs
//     one probe at a time and there are never more workers than the limit.
//   - Entries leave the queue in catalog order. They come back in whatever
//     order the internet feels like.
//   - Taking an entry and bumping the in-flight count happen under one lock.
//     Workers never see a half-updated queue.
//   - The sink is called once per dispatched entry, never concurrently with
//     itself (it sits behind a mutex). A sink that panics loses that one
//     result; the worker keeps going.
//   - Shutdown stops dispatch. Probes already in flight finish (or hit their
//     own deadline) and still report. Nobody gets cut off mid-sentence.
//
// The scan resolves when every worker has found the queue empty (or the
// shutdown flag set) and has reported its last result.
// =============================================================================

use chrono::Utc;
use crossbeam_channel::Sender;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::metrics::ScanMetrics;
use crate::models::{CatalogEntry, ScanResult, ScanSummary};
use crate::prober::{ProbeSettings, Prober};
use crate::transport::HttpTransport;

/// Maximum simultaneous probes unless configured otherwise.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 15;

/// Queue plus in-flight count. Always mutated together.
struct DispatchState {
    pending: VecDeque<Arc<CatalogEntry>>,
    in_flight: usize,
}

/// Transient state of one scan. Dropped when the scan resolves.
struct ScanSession {
    id: Uuid,
    identifier: Arc<str>,
    use_forwarding_proxy: bool,
    total: u64,
    state: Mutex<DispatchState>,
    metrics: ScanMetrics,
}

impl ScanSession {
    /// Take the next entry, unless the queue is empty or shutdown was requested.
    fn next_entry(&self, shutdown: &watch::Receiver<bool>) -> Option<Arc<CatalogEntry>> {
        if *shutdown.borrow() {
            return None;
        }

        let mut state = self.state.lock();
        let entry = state.pending.pop_front()?;
        state.in_flight += 1;
        self.metrics.record_dispatch(state.in_flight as u64);
        Some(entry)
    }

    fn finish_probe(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// The scan coordinator.
pub struct ScanCoordinator {
    prober: Arc<Prober>,
    concurrency_limit: usize,
}

impl ScanCoordinator {
    /// A `concurrency_limit` of zero is treated as one.
    pub fn new(prober: Prober, concurrency_limit: usize) -> Self {
        Self {
            prober: Arc::new(prober),
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        let prober = Prober::new(transport, ProbeSettings::from_config(config));
        Self::new(prober, config.concurrency_limit)
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Probe every entry of `catalog` for `identifier`, calling `on_result`
    /// once per entry as results complete.
    pub async fn scan<F>(
        &self,
        catalog: &[Arc<CatalogEntry>],
        identifier: &str,
        use_forwarding_proxy: bool,
        on_result: F,
    ) -> ScanSummary
    where
        F: FnMut(ScanResult) + Send + 'static,
    {
        // `_` drops the sender right away; the receiver keeps reading `false`.
        let (_, shutdown) = watch::channel(false);
        self.scan_with_shutdown(catalog, identifier, use_forwarding_proxy, shutdown, on_result)
            .await
    }

    /// Like [`scan`](Self::scan), but stops dispatching once `shutdown` reads
    /// `true`. In-flight probes still complete and report.
    pub async fn scan_with_shutdown<F>(
        &self,
        catalog: &[Arc<CatalogEntry>],
        identifier: &str,
        use_forwarding_proxy: bool,
        shutdown: watch::Receiver<bool>,
        on_result: F,
    ) -> ScanSummary
    where
        F: FnMut(ScanResult) + Send + 'static,
    {
        let started_at = Utc::now();
        let clock = tokio::time::Instant::now();

        let session = Arc::new(ScanSession {
            id: Uuid::new_v4(),
            identifier: Arc::from(identifier),
            use_forwarding_proxy,
            total: catalog.len() as u64,
            state: Mutex::new(DispatchState {
                pending: catalog.iter().cloned().collect(),
                in_flight: 0,
            }),
            metrics: ScanMetrics::new(),
        });

        let workers = self.concurrency_limit.min(catalog.len());
        info!(
            session = %session.id,
            identifier = %session.identifier,
            entries = catalog.len(),
            workers,
            proxy = use_forwarding_proxy,
            "Scan starting"
        );

        let sink = Arc::new(Mutex::new(on_result));
        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            set.spawn(run_worker(
                worker_id,
                Arc::clone(&session),
                Arc::clone(&self.prober),
                Arc::clone(&sink),
                shutdown.clone(),
            ));
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(session = %session.id, error = %e, "Scan worker terminated abnormally");
            }
        }

        let counts = session.metrics.snapshot();
        let summary = ScanSummary {
            session_id: session.id,
            identifier: session.identifier.to_string(),
            total: session.total,
            counts,
            cancelled: counts.dispatched < session.total,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if summary.cancelled {
            warn!(
                session = %summary.session_id,
                skipped = summary.skipped(),
                "Scan cancelled before the queue drained"
            );
        }
        info!(
            session = %summary.session_id,
            completed = summary.counts.completed,
            found = summary.counts.found,
            elapsed_ms = summary.elapsed_ms,
            "Scan finished"
        );

        summary
    }

    /// Stream results into a crossbeam channel instead of a closure. A
    /// receiver that hangs up does not stop the scan; its results are dropped.
    pub async fn scan_to_channel(
        &self,
        catalog: &[Arc<CatalogEntry>],
        identifier: &str,
        use_forwarding_proxy: bool,
        shutdown: watch::Receiver<bool>,
        results: Sender<ScanResult>,
    ) -> ScanSummary {
        self.scan_with_shutdown(
            catalog,
            identifier,
            use_forwarding_proxy,
            shutdown,
            move |result| {
                if let Err(e) = results.send(result) {
                    debug!(entry = %e.0.entry.name, "Result receiver gone, dropping result");
                }
            },
        )
        .await
    }
}

/// One worker: take an entry, probe it, report it, repeat.
async fn run_worker<F>(
    worker_id: usize,
    session: Arc<ScanSession>,
    prober: Arc<Prober>,
    sink: Arc<Mutex<F>>,
    shutdown: watch::Receiver<bool>,
) where
    F: FnMut(ScanResult) + Send + 'static,
{
    while let Some(entry) = session.next_entry(&shutdown) {
        let probe = prober.probe(&entry, &session.identifier, session.use_forwarding_proxy);
        let result = match AssertUnwindSafe(probe).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    session = %session.id,
                    worker_id,
                    entry = %entry.name,
                    "Probe panicked, reporting as UNKNOWN"
                );
                Prober::aborted(&entry, &session.identifier)
            }
        };

        let completed = session.metrics.record_outcome(result.outcome);
        debug!(
            session = %session.id,
            worker_id,
            entry = %entry.name,
            outcome = %result.outcome,
            progress = format!("{}/{}", completed, session.total),
            "Result ready"
        );

        let delivered = {
            let mut on_result = sink.lock();
            panic::catch_unwind(AssertUnwindSafe(|| (*on_result)(result)))
        };
        if delivered.is_err() {
            error!(
                session = %session.id,
                worker_id,
                entry = %entry.name,
                "Result sink panicked, continuing scan"
            );
        }
        session.finish_probe();
    }

    debug!(session = %session.id, worker_id, "Worker idle, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProbeOutcome, SiteCategory};
    use crate::transport::testing::{Reply, ScriptedTransport};
    use std::collections::HashSet;
    use std::time::Duration;

    fn catalog(n: usize) -> Vec<Arc<CatalogEntry>> {
        (0..n)
            .map(|i| {
                Arc::new(CatalogEntry::new(
                    format!("site-{i}"),
                    format!("https://site-{i}.test/{{}}"),
                    SiteCategory::Other,
                ))
            })
            .collect()
    }

    fn coordinator(transport: Arc<ScriptedTransport>, limit: usize) -> ScanCoordinator {
        ScanCoordinator::new(Prober::new(transport, ProbeSettings::default()), limit)
    }

    fn collector() -> (Arc<Mutex<Vec<ScanResult>>>, impl FnMut(ScanResult) + Send + 'static) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink_results = Arc::clone(&results);
        (results, move |r| sink_results.lock().push(r))
    }

    #[tokio::test]
    async fn test_empty_catalog_resolves_without_results() {
        let transport = Arc::new(ScriptedTransport::new(Reply::status(200)));
        let (results, sink) = collector();
        let summary = coordinator(transport, 15).scan(&[], "bob", false, sink).await;
        assert!(results.lock().is_empty());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.counts.completed, 0);
        assert!(!summary.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_entry_reported_exactly_once() {
        let transport = Arc::new(ScriptedTransport::new(
            Reply::status(200).after(Duration::from_millis(50)),
        ));
        let entries = catalog(47);
        let (results, sink) = collector();
        let summary = coordinator(transport, 15).scan(&entries, "bob", false, sink).await;

        let results = results.lock();
        assert_eq!(results.len(), 47);
        let names: HashSet<_> = results.iter().map(|r| r.entry.name.clone()).collect();
        assert_eq!(names.len(), 47);
        assert_eq!(summary.counts.completed, 47);
        assert_eq!(summary.counts.found, 47);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_never_exceeds_ceiling() {
        let transport = Arc::new(ScriptedTransport::new(
            Reply::status(200).after(Duration::from_millis(100)),
        ));
        let (_, sink) = collector();
        let summary = coordinator(transport.clone(), 4)
            .scan(&catalog(20), "bob", false, sink)
            .await;
        assert_eq!(transport.peak_in_flight(), 4);
        assert_eq!(summary.counts.peak_in_flight, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ceiling_is_fifteen() {
        let transport = Arc::new(ScriptedTransport::new(
            Reply::status(404).after(Duration::from_millis(100)),
        ));
        let (_, sink) = collector();
        let coordinator = coordinator(transport.clone(), DEFAULT_CONCURRENCY_LIMIT);
        coordinator.scan(&catalog(40), "bob", false, sink).await;
        assert_eq!(transport.peak_in_flight(), 15);
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped() {
        let transport = Arc::new(ScriptedTransport::new(Reply::status(200)));
        let coordinator = coordinator(transport, 0);
        assert_eq!(coordinator.concurrency_limit(), 1);
        let (results, sink) = collector();
        coordinator.scan(&catalog(3), "bob", false, sink).await;
        assert_eq!(results.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_follows_catalog_order() {
        let transport = Arc::new(ScriptedTransport::new(Reply::status(200)));
        let (_, sink) = collector();
        coordinator(transport.clone(), 1)
            .scan(&catalog(5), "bob", false, sink)
            .await;
        let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
        let expected: Vec<_> = (0..5).map(|i| format!("https://site-{i}.test/bob")).collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_arrive_in_completion_order() {
        let transport = Arc::new(
            ScriptedTransport::new(Reply::status(200))
                .reply(
                    "https://site-0.test/bob",
                    Reply::status(200).after(Duration::from_millis(300)),
                )
                .reply(
                    "https://site-1.test/bob",
                    Reply::status(200).after(Duration::from_millis(100)),
                ),
        );
        let (results, sink) = collector();
        coordinator(transport, 3)
            .scan(&catalog(3), "bob", false, sink)
            .await;
        let order: Vec<_> = results.lock().iter().map(|r| r.entry.name.clone()).collect();
        assert_eq!(order, vec!["site-2", "site-1", "site-0"]);
    }

    #[tokio::test]
    async fn test_end_to_end_found() {
        let transport = Arc::new(ScriptedTransport::new(Reply::status(200)));
        let entries = vec![Arc::new(CatalogEntry::new("A", "https://a.test/{}", SiteCategory::Other))];
        let (results, sink) = collector();
        coordinator(transport, 15).scan(&entries, "bob", false, sink).await;

        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, ProbeOutcome::Found);
        assert_eq!(results[0].profile_url, "https://a.test/bob");
    }

    #[tokio::test]
    async fn test_end_to_end_not_found() {
        let transport = Arc::new(ScriptedTransport::new(Reply::status(404)));
        let entries = vec![Arc::new(CatalogEntry::new("A", "https://a.test/{}", SiteCategory::Other))];
        let (results, sink) = collector();
        coordinator(transport, 15).scan(&entries, "bob", false, sink).await;
        assert_eq!(results.lock()[0].outcome, ProbeOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_never_responds() {
        let transport = Arc::new(ScriptedTransport::new(Reply::Hang));
        let entries = vec![Arc::new(CatalogEntry::new("A", "https://a.test/{}", SiteCategory::Other))];
        let (results, sink) = collector();
        let summary = coordinator(transport, 15).scan(&entries, "bob", false, sink).await;

        let results = results.lock();
        assert_eq!(results[0].outcome, ProbeOutcome::Error);
        assert!(results[0].latency_ms >= 8_000);
        assert_eq!(summary.counts.error, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_failures_still_report_everything() {
        let transport = Arc::new(
            ScriptedTransport::new(Reply::status(200))
                .reply("https://site-0.test/bob", Reply::Fail("connection refused".into()))
                .reply("https://site-1.test/bob", Reply::Hang)
                .reply("https://site-2.test/bob", Reply::status(429))
                .reply("https://site-3.test/bob", Reply::status(503)),
        );
        let (results, sink) = collector();
        let summary = coordinator(transport, 2)
            .scan(&catalog(6), "bob", false, sink)
            .await;

        assert_eq!(results.lock().len(), 6);
        assert_eq!(summary.counts.error, 3);
        assert_eq!(summary.counts.blocked, 1);
        assert_eq!(summary.counts.found, 2);
    }

    #[tokio::test]
    async fn test_panicking_probe_reports_unknown() {
        let transport = Arc::new(
            ScriptedTransport::new(Reply::status(200)).reply("https://site-1.test/bob", Reply::Panic),
        );
        let (results, sink) = collector();
        let summary = coordinator(transport, 2)
            .scan(&catalog(3), "bob", false, sink)
            .await;

        let results = results.lock();
        assert_eq!(results.len(), 3);
        let crashed = results.iter().find(|r| r.entry.name == "site-1").unwrap();
        assert_eq!(crashed.outcome, ProbeOutcome::Unknown);
        assert_eq!(crashed.profile_url, "https://site-1.test/bob");
        assert_eq!(summary.counts.unknown, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_in_flight_and_stops_dispatch() {
        let transport = Arc::new(ScriptedTransport::new(
            Reply::status(200).after(Duration::from_millis(100)),
        ));
        let (tx, rx) = watch::channel(false);
        let (results, sink) = collector();
        let coordinator = coordinator(transport.clone(), 1);
        let entries = catalog(3);

        let (summary, _) = tokio::join!(
            coordinator.scan_with_shutdown(&entries, "bob", false, rx, sink),
            async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                tx.send(true).unwrap();
            }
        );

        // site-0 done at 100ms, site-1 in flight at 150ms and allowed to finish.
        let names: Vec<_> = results.lock().iter().map(|r| r.entry.name.clone()).collect();
        assert_eq!(names, vec!["site-0", "site-1"]);
        assert_eq!(transport.requests().len(), 2);
        assert!(summary.cancelled);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.counts.completed, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_sink_calls_never_overlap_across_threads() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let transport = Arc::new(ScriptedTransport::new(
            Reply::status(200).after(Duration::from_millis(1)),
        ));
        let inside = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));

        let sink = {
            let inside = Arc::clone(&inside);
            let overlap = Arc::clone(&overlap);
            let results = Arc::clone(&results);
            move |r: ScanResult| {
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                overlap.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_micros(200));
                results.lock().push(r.entry.name.clone());
                inside.fetch_sub(1, Ordering::SeqCst);
            }
        };

        let summary = coordinator(transport.clone(), 15)
            .scan(&catalog(300), "bob", false, sink)
            .await;

        let results = results.lock();
        assert_eq!(results.len(), 300);
        let names: HashSet<_> = results.iter().cloned().collect();
        assert_eq!(names.len(), 300);
        assert_eq!(overlap.load(Ordering::SeqCst), 1);
        assert!(summary.counts.peak_in_flight <= 15);
        assert!(transport.peak_in_flight() <= 15);
        assert_eq!(summary.counts.completed, 300);
    }

    #[tokio::test]
    async fn test_panicking_sink_does_not_stall_scan() {
        let transport = Arc::new(ScriptedTransport::new(Reply::status(200)));
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let results = Arc::clone(&results);
            move |r: ScanResult| {
                if r.entry.name == "site-1" {
                    panic!("sink rejected {}", r.entry.name);
                }
                results.lock().push(r.entry.name.clone());
            }
        };

        let summary = coordinator(transport.clone(), 1)
            .scan(&catalog(3), "bob", false, sink)
            .await;

        assert_eq!(*results.lock(), vec!["site-0", "site-2"]);
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(summary.counts.dispatched, 3);
        assert_eq!(summary.counts.completed, 3);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_scan_to_channel_streams_every_result() {
        let transport = Arc::new(ScriptedTransport::new(Reply::status(200)));
        let (tx, rx) = crossbeam_channel::unbounded();
        let (_keep, shutdown) = watch::channel(false);
        let summary = coordinator(transport, 5)
            .scan_to_channel(&catalog(12), "bob", false, shutdown, tx)
            .await;

        assert_eq!(rx.try_iter().count(), 12);
        assert_eq!(summary.counts.completed, 12);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_stop_scan() {
        let transport = Arc::new(ScriptedTransport::new(Reply::status(200)));
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let (_keep, shutdown) = watch::channel(false);
        let summary = coordinator(transport, 5)
            .scan_to_channel(&catalog(4), "bob", false, shutdown, tx)
            .await;
        assert_eq!(summary.counts.completed, 4);
        assert!(!summary.cancelled);
    }
}
