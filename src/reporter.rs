//! Report queue and batch dispatcher.
//!
//! Reports are appended to an in-memory FIFO queue and shipped in batches,
//! either when the queue reaches the configured batch size or when the
//! periodic flush timer fires. A batch that cannot be delivered is pushed back
//! to the front of the queue so global order is kept across retries.

use crate::category::{ErrorCategory, Severity};
use crate::context::ErrorContext;
use crate::error::{CanonicalError, ReportingError};
use crate::report::{ErrorReport, ReportPayload, ReportingStats};
use crate::retry::with_retry;
use crate::settings::{OverflowPolicy, ReportingSettings};
use crate::sink::{HttpSink, ReportSink};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Empty,
    /// The batch of this size was delivered (or dropped as a no-op without endpoint).
    Delivered(usize),
    /// Delivery failed and the batch of this size went back to the queue.
    Requeued(usize),
    /// Another flush owns the queue right now.
    InFlight,
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<ErrorReport>,
    stats: ReportingStats,
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    settings: ReportingSettings,
    sink: Option<Arc<dyn ReportSink>>,
    enabled: AtomicBool,
    flushing: AtomicBool,
    state: Mutex<QueueState>,
    flush_requested: Arc<Notify>,
    flush_done: Notify,
    worker: Mutex<Option<Worker>>,
}

/// Clears the in-flight flag and wakes waiters when a flush ends, however it ends.
struct FlushGuard<'a> {
    flushing: &'a AtomicBool,
    done: &'a Notify,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flushing.store(false, Ordering::Release);
        self.done.notify_waiters();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn enqueue(&self, report: ErrorReport) -> Option<Uuid> {
        let id = report.id;
        let max = self.settings.max_queue_size.max(1);

        let trigger = {
            let mut state = lock(&self.state);
            state.stats.record(&report);

            if state.queue.len() >= max {
                state.stats.dropped_reports += 1;
                match self.settings.overflow {
                    OverflowPolicy::DropOldest => {
                        state.queue.pop_front();
                    }
                    OverflowPolicy::DropNewest => {
                        tracing::warn!(report_id = %id, "error report queue full, dropping report");
                        state.stats.queue_depth = state.queue.len();
                        return None;
                    }
                }
            }

            state.queue.push_back(report);
            state.stats.queue_depth = state.queue.len();
            state.queue.len() >= self.settings.batch_size
        };

        if trigger {
            self.flush_requested.notify_one();
        }
        Some(id)
    }

    async fn flush(&self) -> FlushOutcome {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlushOutcome::InFlight;
        }
        let _guard = FlushGuard {
            flushing: &self.flushing,
            done: &self.flush_done,
        };

        // Later arrivals start a fresh queue and are not part of this batch.
        let batch = {
            let mut state = lock(&self.state);
            state.stats.last_flush_attempt = Some(Utc::now());
            let batch: Vec<ErrorReport> = state.queue.drain(..).collect();
            state.stats.queue_depth = 0;
            batch
        };

        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let count = batch.len();

        let Some(sink) = &self.sink else {
            tracing::debug!(count, "no reporting endpoint configured, discarding batch");
            self.record_delivery(count);
            return FlushOutcome::Delivered(count);
        };

        let payload = ReportPayload::new(
            batch,
            self.settings.app_version.clone(),
            self.settings.platform.clone(),
        );
        let context = ErrorContext::new("deliver_error_reports").with_service("error-reporting");
        let delivery = with_retry(
            || sink.deliver(&payload),
            &self.settings.delivery_policy,
            &context,
        )
        .await;

        match delivery {
            Ok(()) => {
                tracing::debug!(count, "delivered error report batch");
                self.record_delivery(count);
                FlushOutcome::Delivered(count)
            }
            Err(error) => {
                tracing::warn!(
                    count,
                    code = %error.code(),
                    error = %error.message(),
                    "error report delivery failed, requeueing batch"
                );
                self.requeue(payload.reports);
                FlushOutcome::Requeued(count)
            }
        }
    }

    fn record_delivery(&self, count: usize) {
        let mut state = lock(&self.state);
        state.stats.last_reported = Some(Utc::now());
        state.stats.delivered_reports += count as u64;
        state.stats.queue_depth = state.queue.len();
    }

    fn requeue(&self, batch: Vec<ErrorReport>) {
        let max = self.settings.max_queue_size.max(1);
        let mut state = lock(&self.state);

        for report in batch.into_iter().rev() {
            state.queue.push_front(report);
        }

        let mut dropped = 0u64;
        while state.queue.len() > max {
            match self.settings.overflow {
                OverflowPolicy::DropOldest => state.queue.pop_front(),
                OverflowPolicy::DropNewest => state.queue.pop_back(),
            };
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "error report queue over capacity after requeue");
        }

        state.stats.dropped_reports += dropped;
        state.stats.failed_flushes += 1;
        state.stats.queue_depth = state.queue.len();
    }
}

async fn run_worker(
    inner: Weak<Inner>,
    flush_requested: Arc<Notify>,
    mut stop: watch::Receiver<bool>,
    period: std::time::Duration,
) {
    let period = period.max(std::time::Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
            _ = flush_requested.notified() => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.flush().await;
    }

    tracing::debug!("error report flush worker stopped");
}

/// Explicitly owned reporting service.
///
/// Cloning yields another handle to the same queue. The background flush
/// worker only exists between [`ErrorReporter::start`] and
/// [`ErrorReporter::shutdown`] (or [`ErrorReporter::set_enabled`]`(false)`).
#[derive(Clone)]
pub struct ErrorReporter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("enabled", &self.is_enabled())
            .field("running", &self.is_running())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl ErrorReporter {
    /// Create a reporter delivering over HTTP when an endpoint is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: ReportingSettings) -> Result<Self, ReportingError> {
        let sink = HttpSink::from_settings(&settings)?
            .map(|sink| Arc::new(sink) as Arc<dyn ReportSink>);
        Ok(Self::build(settings, sink))
    }

    /// Create a reporter delivering to a custom sink.
    pub fn with_sink(settings: ReportingSettings, sink: Arc<dyn ReportSink>) -> Self {
        Self::build(settings, Some(sink))
    }

    fn build(settings: ReportingSettings, sink: Option<Arc<dyn ReportSink>>) -> Self {
        let enabled = settings.enabled;
        Self {
            inner: Arc::new(Inner {
                settings,
                sink,
                enabled: AtomicBool::new(enabled),
                flushing: AtomicBool::new(false),
                state: Mutex::new(QueueState::default()),
                flush_requested: Arc::new(Notify::new()),
                flush_done: Notify::new(),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &ReportingSettings {
        &self.inner.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Whether the periodic flush worker is active.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.worker).is_some()
    }

    /// Start the periodic flush worker if reporting is enabled.
    ///
    /// Returns `true` when a worker is running afterwards. Must be called
    /// from within a Tokio runtime; outside one this logs and returns `false`.
    pub fn start(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let mut worker = lock(&self.inner.worker);
        if worker.is_some() {
            return true;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!(error = %err, "cannot start error report flush worker without a runtime");
                return false;
            }
        };

        let (stop, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(run_worker(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.flush_requested),
            stop_rx,
            self.inner.settings.flush_interval,
        ));
        *worker = Some(Worker { stop, handle });
        tracing::debug!(
            interval_ms = self.inner.settings.flush_interval.as_millis() as u64,
            "error report flush worker started"
        );
        true
    }

    /// Enable or disable reporting.
    ///
    /// Disabling stops the periodic flush but lets an in-flight delivery
    /// finish. Enabling restarts the worker.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
        if enabled {
            self.start();
        } else if self.stop_worker().is_some() {
            tracing::debug!("error reporting disabled, flush worker signalled to stop");
        }
    }

    /// Signal the worker to stop. The task finishes any flush in progress
    /// before observing the signal; the returned handle resolves after that.
    fn stop_worker(&self) -> Option<JoinHandle<()>> {
        let worker = lock(&self.inner.worker).take()?;
        let _ = worker.stop.send(true);
        Some(worker.handle)
    }

    /// Queue a classified error for delivery. Never fails and never blocks
    /// on delivery.
    ///
    /// `severity` and `category` override the values derived from the error.
    /// Returns the report id, or `None` when reporting is disabled or the
    /// report was dropped by the overflow policy.
    pub fn report_error(
        &self,
        error: &CanonicalError,
        context: &ErrorContext,
        severity: Option<Severity>,
        category: Option<ErrorCategory>,
        extra: Map<String, Value>,
    ) -> Option<Uuid> {
        if !self.is_enabled() {
            tracing::trace!(code = %error.code(), "error reporting disabled, skipping report");
            return None;
        }

        let report = ErrorReport::new(
            error.clone(),
            context.clone(),
            severity.unwrap_or_else(|| error.severity()),
            category.unwrap_or_else(|| error.category()),
            extra,
        );
        self.inner.enqueue(report)
    }

    /// Deliver everything currently queued as one batch.
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush().await
    }

    /// Stop the worker and make one final, best-effort flush.
    ///
    /// Waits for any flush already in progress, so reports queued during it
    /// are part of the final batch.
    pub async fn shutdown(&self) -> FlushOutcome {
        if let Some(handle) = self.stop_worker() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "error report flush worker ended abnormally");
            }
        }

        let outcome = loop {
            let mut idle = std::pin::pin!(self.inner.flush_done.notified());
            idle.as_mut().enable();
            match self.flush().await {
                FlushOutcome::InFlight => idle.await,
                outcome => break outcome,
            }
        };
        tracing::debug!(?outcome, "error reporter shut down");
        outcome
    }

    /// Snapshot of the reporting statistics.
    pub fn stats(&self) -> ReportingStats {
        lock(&self.inner.state).stats.clone()
    }

    /// Copy of the queued reports, oldest first.
    pub fn pending(&self) -> Vec<ErrorReport> {
        lock(&self.inner.state).queue.iter().cloned().collect()
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }
}
