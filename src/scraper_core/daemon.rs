//! The ingestion daemon: admission gating, buffering and the flush cycle.
//!
//! One task owns the buffer and consumes the transport channel; a feed
//! supervisor runs transport sessions and backs off between failures; a
//! flush worker owns the store and writes batches handed over a small
//! bounded channel. A full buffer is swapped out in O(1), so admission
//! continues into a fresh buffer while the previous batch is still being
//! written.

use crate::config::ScraperConfig;
use crate::events::MarketEvent;
use crate::scraper_core::backoff::Backoff;
use crate::scraper_core::buffer::EventBuffer;
use crate::scraper_core::transport::FeedTransport;
use crate::scraper_core::validator::{self, Rejection};
use crate::store::{EventStore, StoreError};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

/// Batches queued for the flush worker before admission has to wait.
const FLUSH_QUEUE_DEPTH: usize = 4;
/// Raw payloads buffered between the transport and the daemon.
const FEED_CHANNEL_DEPTH: usize = 10_000;
/// Reconnect delay bounds for the feed supervisor.
const FEED_BACKOFF_INITIAL_MS: u64 = 1_000;
const FEED_BACKOFF_MAX_MS: u64 = 60_000;
/// A session that lived this long counts as healthy and resets the delay.
const HEALTHY_SESSION_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Idle,
    Connecting,
    Running,
    ErrorBackoff,
    Draining,
    Stopped,
}

#[derive(Debug)]
pub enum DaemonError {
    Store(StoreError),
}

impl From<StoreError> for DaemonError {
    fn from(err: StoreError) -> Self {
        DaemonError::Store(err)
    }
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::Store(e) => write!(f, "Store error: {}", e),
        }
    }
}

impl std::error::Error for DaemonError {}

/// Background-task notifications that drive the daemon's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthSignal {
    FeedLost,
    FeedReconnecting,
    StoreRetrying,
    StoreCleared,
}

/// What the flush worker accomplished over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub batches: u64,
    pub events_flushed: u64,
    pub batches_dropped: u64,
    pub events_dropped: u64,
}

/// Final accounting returned by [`Daemon::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonReport {
    pub final_state: DaemonState,
    pub admitted: u64,
    pub duplicates: u64,
    pub ignored: u64,
    pub rejected: u64,
    pub flush: FlushStats,
}

pub struct Daemon {
    config: ScraperConfig,
    state: DaemonState,
}

impl Daemon {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            state: DaemonState::Idle,
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Drives ingestion until the feed ends or `stop` fires, then drains.
    ///
    /// Transport loss and store write failures move the daemon into
    /// `ErrorBackoff`; the feed supervisor reconnects indefinitely while the
    /// flush worker retries a bounded number of times per batch. The
    /// admission gates are seeded from the store, never from memory, so a
    /// restart after a crash mid-flush re-discards whatever was already
    /// committed.
    pub async fn run(
        mut self,
        transport: Box<dyn FeedTransport>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<DaemonReport, DaemonError> {
        let store = EventStore::open(&self.config.db_path)?;
        let mut order_gate = store.max_sequences(&self.config.products)?;
        let mut trade_gate = store.max_trade_ids(&self.config.products)?;

        let (feed_tx, mut feed_rx) = mpsc::channel::<String>(FEED_CHANNEL_DEPTH);
        let (batch_tx, batch_rx) = mpsc::channel::<Vec<MarketEvent>>(FLUSH_QUEUE_DEPTH);
        let (status_tx, mut status_rx) = mpsc::channel::<HealthSignal>(16);

        let store_retries = self.config.store_retries;
        let flush_handle = tokio::spawn(flush_worker(
            store,
            batch_rx,
            store_retries,
            status_tx.clone(),
        ));

        self.state = DaemonState::Connecting;
        log::info!(
            "🚀 Scraper daemon starting: {} product(s), buffer {}, {} transport",
            self.config.products.len(),
            self.config.buffer_size,
            transport.transport_type()
        );

        let transport_handle = tokio::spawn(feed_supervisor(transport, feed_tx, status_tx));

        let mut buffer = EventBuffer::new(self.config.buffer_size);
        let mut admitted = 0u64;
        let mut duplicates = 0u64;
        let mut ignored = 0u64;
        let mut rejected = 0u64;
        let mut recent_admitted = 0u64;
        let mut last_log_time = Instant::now();

        loop {
            tokio::select! {
                maybe_payload = feed_rx.recv() => {
                    let payload = match maybe_payload {
                        Some(payload) => payload,
                        None => {
                            log::warn!("⚠️ Feed channel closed, draining");
                            break;
                        }
                    };

                    match validator::classify_text(&payload) {
                        Ok(event) => {
                            if matches!(self.state, DaemonState::Connecting | DaemonState::ErrorBackoff) {
                                self.state = DaemonState::Running;
                                log::info!("📊 Validated events flowing, daemon running");
                            }

                            if admit(&mut order_gate, &mut trade_gate, &event) {
                                admitted += 1;
                                recent_admitted += 1;
                                if let Some(batch) = buffer.push(event) {
                                    log::debug!("📦 Buffer full, handing {} events to flush worker", batch.len());
                                    if batch_tx.send(batch).await.is_err() {
                                        log::error!("❌ Flush worker is gone, draining");
                                        break;
                                    }
                                }
                            } else {
                                duplicates += 1;
                                log::debug!("⏭️ Discarded duplicate/out-of-order event");
                            }
                        }
                        Err(Rejection::IgnoredType(msg_type)) => {
                            ignored += 1;
                            log::debug!("⏭️ Ignored '{}' message", msg_type);
                        }
                        Err(rejection) => {
                            rejected += 1;
                            log::warn!("⚠️ Rejected payload: {}", rejection);
                        }
                    }

                    // Log throughput every 10 seconds
                    if last_log_time.elapsed().as_secs() >= 10 {
                        let rate = recent_admitted as f64 / last_log_time.elapsed().as_secs_f64();
                        log::info!(
                            "📊 Ingestion rate: {:.1} events/sec ({} admitted, {} duplicates, {} ignored, {} rejected)",
                            rate,
                            admitted,
                            duplicates,
                            ignored,
                            rejected
                        );
                        last_log_time = Instant::now();
                        recent_admitted = 0;
                    }
                }
                maybe_signal = status_rx.recv() => {
                    match maybe_signal {
                        Some(HealthSignal::FeedLost) | Some(HealthSignal::StoreRetrying) => {
                            if matches!(self.state, DaemonState::Connecting | DaemonState::Running) {
                                self.state = DaemonState::ErrorBackoff;
                                log::info!("⏳ Backing off until the feed and store recover");
                            }
                        }
                        Some(HealthSignal::FeedReconnecting) => {
                            if self.state == DaemonState::ErrorBackoff {
                                self.state = DaemonState::Connecting;
                            }
                        }
                        Some(HealthSignal::StoreCleared) => {
                            if self.state == DaemonState::ErrorBackoff {
                                self.state = DaemonState::Running;
                            }
                        }
                        None => {
                            log::error!("❌ All background workers are gone, draining");
                            break;
                        }
                    }
                }
                _ = stop.changed() => {
                    log::info!("🛑 Stop requested");
                    break;
                }
            }
        }

        self.state = DaemonState::Draining;
        transport_handle.abort();

        if !buffer.is_empty() {
            let remainder = buffer.take();
            log::info!("📦 Final flush of {} buffered events", remainder.len());
            if batch_tx.send(remainder).await.is_err() {
                log::error!("❌ Flush worker is gone, final batch lost");
            }
        }
        drop(batch_tx);

        let grace = Duration::from_secs(self.config.stop_grace_secs);
        let flush = match tokio::time::timeout(grace, flush_handle).await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                log::error!("❌ Flush worker panicked: {}", e);
                FlushStats::default()
            }
            Err(_) => {
                log::error!(
                    "❌ Flush worker still busy after {}s grace period, exiting anyway",
                    self.config.stop_grace_secs
                );
                FlushStats::default()
            }
        };

        self.state = DaemonState::Stopped;
        log::info!(
            "✅ Daemon stopped: {} admitted, {} duplicates, {} ignored, {} rejected, {} flushed",
            admitted,
            duplicates,
            ignored,
            rejected,
            flush.events_flushed
        );

        Ok(DaemonReport {
            final_state: self.state,
            admitted,
            duplicates,
            ignored,
            rejected,
            flush,
        })
    }
}

/// Owns the transport: runs one session after another, backing off between
/// failures. A session that survived [`HEALTHY_SESSION_SECS`] resets the
/// delay so one hiccup after hours of uptime reconnects quickly.
async fn feed_supervisor(
    mut transport: Box<dyn FeedTransport>,
    feed_tx: mpsc::Sender<String>,
    status_tx: mpsc::Sender<HealthSignal>,
) {
    let mut backoff = Backoff::unbounded(FEED_BACKOFF_INITIAL_MS, FEED_BACKOFF_MAX_MS);

    loop {
        let session_start = Instant::now();
        match transport.run(feed_tx.clone()).await {
            Ok(()) => break,
            Err(e) => {
                if feed_tx.is_closed() {
                    break;
                }
                log::warn!("⚠️ Feed session ended: {}", e);
                if session_start.elapsed().as_secs() >= HEALTHY_SESSION_SECS {
                    backoff.reset();
                }
                let _ = status_tx.try_send(HealthSignal::FeedLost);
                let _ = backoff.sleep().await;
                let _ = status_tx.try_send(HealthSignal::FeedReconnecting);
            }
        }
    }
}

/// Per-product monotonic gates. An event at or below the high-water mark is
/// a duplicate (or a replay after reconnect) and is discarded.
fn admit(
    order_gate: &mut HashMap<String, i64>,
    trade_gate: &mut HashMap<String, i64>,
    event: &MarketEvent,
) -> bool {
    match event {
        MarketEvent::Order(order) => {
            let last = order_gate.entry(order.product_id.clone()).or_insert(0);
            if order.exchange_sequence <= *last {
                return false;
            }
            *last = order.exchange_sequence;
            true
        }
        MarketEvent::Trade(trade) => {
            let last = trade_gate.entry(trade.product_id.clone()).or_insert(0);
            if trade.trade_id <= *last {
                return false;
            }
            *last = trade.trade_id;
            true
        }
    }
}

/// Owns the store; retries each failed batch with backoff and drops it once
/// the retry budget is spent, so a sick disk degrades to data loss instead of
/// stalled ingestion. Health signals keep the daemon's state honest while a
/// batch is stuck.
async fn flush_worker(
    mut store: EventStore,
    mut rx: mpsc::Receiver<Vec<MarketEvent>>,
    store_retries: u32,
    status_tx: mpsc::Sender<HealthSignal>,
) -> FlushStats {
    let mut stats = FlushStats::default();

    while let Some(batch) = rx.recv().await {
        let mut backoff = Backoff::bounded(500, 30_000, store_retries);
        let mut faltered = false;
        loop {
            match store.insert_batch(&batch) {
                Ok(inserted) => {
                    stats.batches += 1;
                    stats.events_flushed += batch.len() as u64;
                    if faltered {
                        let _ = status_tx.try_send(HealthSignal::StoreCleared);
                    }
                    if inserted < batch.len() {
                        log::debug!(
                            "📦 {} of {} rows were already present",
                            batch.len() - inserted,
                            batch.len()
                        );
                    }
                    break;
                }
                Err(e) => {
                    log::error!("❌ Batch flush failed: {}", e);
                    if !faltered {
                        faltered = true;
                        let _ = status_tx.try_send(HealthSignal::StoreRetrying);
                    }
                    if backoff.sleep().await.is_err() {
                        log::error!(
                            "❌ Dropping batch of {} events after {} attempts",
                            batch.len(),
                            store_retries + 1
                        );
                        stats.batches_dropped += 1;
                        stats.events_dropped += batch.len() as u64;
                        let _ = status_tx.try_send(HealthSignal::StoreCleared);
                        break;
                    }
                }
            }
        }
    }

    log::info!(
        "✅ Flush worker finished: {} batches, {} events",
        stats.batches,
        stats.events_flushed
    );
    stats
}
