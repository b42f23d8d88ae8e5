//! Windowed feature extraction over the stored event log.
//!
//! Windows are processed in chunks. Each chunk issues one covering range
//! query, slices it per window with a binary search, and runs the table's
//! metric policy on every slice. A small worker pool pulls chunks from a
//! shared queue so independent chunks overlap their database reads.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::config::{ConfigError, FeaturesConfig};
use crate::features_core::exporter::write_csv;
use crate::features_core::orders::OrderFeatures;
use crate::features_core::trades::TradeFeatures;
use crate::features_core::window::{plan, Category, Table, Window};
use crate::features_core::{table_columns, FeatureRecord, FeatureSet};
use crate::store::{EventReader, StoreError};

#[derive(Debug)]
pub enum ExtractError {
    Config(ConfigError),
    Store(StoreError),
    Io(std::io::Error),
}

impl From<ConfigError> for ExtractError {
    fn from(err: ConfigError) -> Self {
        ExtractError::Config(err)
    }
}

impl From<StoreError> for ExtractError {
    fn from(err: StoreError) -> Self {
        ExtractError::Store(err)
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        ExtractError::Io(err)
    }
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Config(e) => write!(f, "Invalid extraction request: {}", e),
            ExtractError::Store(e) => write!(f, "Storage error: {}", e),
            ExtractError::Io(e) => write!(f, "Export IO error: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

enum ChunkOutcome {
    Records(Vec<FeatureRecord>),
    Failed(Vec<Window>),
}

/// One covering query for the chunk's span, then a per-window slice via
/// binary search. Relies on the reader returning events sorted by timestamp.
fn process_chunk(
    reader: &EventReader,
    product: &str,
    table: Table,
    windows: &[Window],
) -> Result<Vec<FeatureRecord>, StoreError> {
    let first = match windows.first() {
        Some(w) => w.start,
        None => return Ok(Vec::new()),
    };
    // Window starts ascend with a fixed span, so the last window ends latest
    let last = windows.last().map(|w| w.end).unwrap_or(first);

    let mut records = Vec::with_capacity(windows.len());
    match table {
        Table::Trades => {
            let events = reader.trades_in_range(product, first, last)?;
            for window in windows {
                let lo = events.partition_point(|e| e.timestamp < window.start);
                let hi = events.partition_point(|e| e.timestamp < window.end);
                records.push(FeatureRecord {
                    product_id: product.to_string(),
                    table,
                    window: *window,
                    values: TradeFeatures.compute(&events[lo..hi]),
                });
            }
        }
        Table::Orders => {
            let events = reader.orders_in_range(product, first, last)?;
            for window in windows {
                let lo = events.partition_point(|e| e.timestamp < window.start);
                let hi = events.partition_point(|e| e.timestamp < window.end);
                records.push(FeatureRecord {
                    product_id: product.to_string(),
                    table,
                    window: *window,
                    values: OrderFeatures.compute(&events[lo..hi]),
                });
            }
        }
    }
    Ok(records)
}

/// Compute one table's feature series for a product.
///
/// A failed chunk is retried once against the same reader; if it fails
/// again its windows are dropped from the series and counted in a summary
/// warning. The result is sorted by window start.
pub async fn extract_series(
    config: &FeaturesConfig,
    product: &str,
    table: Table,
    windows: &[Window],
) -> Vec<FeatureRecord> {
    if windows.is_empty() {
        return Vec::new();
    }

    let chunks: VecDeque<Vec<Window>> = windows
        .chunks(config.chunk_size.max(1))
        .map(|c| c.to_vec())
        .collect();
    let chunk_count = chunks.len();
    let queue = Arc::new(Mutex::new(chunks));

    let (tx, mut rx) = mpsc::channel::<ChunkOutcome>(chunk_count);

    let worker_count = config.workers.max(1).min(chunk_count);
    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let db_path = config.db_path.clone();
        let product = product.to_string();

        handles.push(tokio::spawn(async move {
            let reader = match EventReader::open(&db_path) {
                Ok(reader) => reader,
                Err(e) => {
                    log::error!("❌ Failed to open reader for {}: {}", product, e);
                    // Hand the remaining chunks back as failures instead of
                    // leaving them stuck in the queue
                    loop {
                        let chunk = queue.lock().unwrap().pop_front();
                        match chunk {
                            Some(chunk) => {
                                if tx.send(ChunkOutcome::Failed(chunk)).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    return;
                }
            };

            loop {
                let chunk = queue.lock().unwrap().pop_front();
                let chunk = match chunk {
                    Some(chunk) => chunk,
                    None => break,
                };

                let outcome = match process_chunk(&reader, &product, table, &chunk) {
                    Ok(records) => ChunkOutcome::Records(records),
                    Err(e) => {
                        log::warn!(
                            "⚠️ Chunk at {} failed for {}, retrying once: {}",
                            chunk[0].start,
                            product,
                            e
                        );
                        match process_chunk(&reader, &product, table, &chunk) {
                            Ok(records) => ChunkOutcome::Records(records),
                            Err(e) => {
                                log::warn!(
                                    "⚠️ Giving up on chunk at {} for {}: {}",
                                    chunk[0].start,
                                    product,
                                    e
                                );
                                ChunkOutcome::Failed(chunk)
                            }
                        }
                    }
                };

                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut records = Vec::with_capacity(windows.len());
    let mut dropped_windows = 0usize;
    while let Some(outcome) = rx.recv().await {
        match outcome {
            ChunkOutcome::Records(batch) => records.extend(batch),
            ChunkOutcome::Failed(chunk) => dropped_windows += chunk.len(),
        }
    }

    for handle in handles {
        let _ = handle.await;
    }

    if dropped_windows > 0 {
        log::warn!(
            "⚠️ Omitted {} of {} {} windows for {} after storage failures",
            dropped_windows,
            windows.len(),
            table.as_str(),
            product
        );
    }

    // Workers finish out of order
    records.sort_by_key(|r| r.window.start);
    records
}

/// Plan the window series for `[start, end)`, extract every configured
/// product, and export one CSV per table and product.
///
/// The product set is the configuration's, not whatever the store happens
/// to hold: a configured product with no recorded events still gets its
/// file (all windows empty), and stored products nobody asked for get none.
pub async fn run_extraction(
    config: &FeaturesConfig,
    category: Category,
    start: i64,
    end: i64,
    resolution_ms: i64,
    stride_pct: u8,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, ExtractError> {
    let windows = plan(start, end, resolution_ms, stride_pct, category)?;
    if windows.is_empty() {
        log::info!("⏭️ Empty window plan, nothing to export");
        return Ok(Vec::new());
    }
    log::info!(
        "📊 Extracting {} features: {} windows per product",
        category.as_str(),
        windows.len()
    );

    let mut written = Vec::new();
    for table in category.tables() {
        for product in &config.products {
            let records = extract_series(config, product, *table, &windows).await;
            let path = write_csv(out_dir, *table, product, table_columns(*table), &records)?;
            log::info!(
                "✅ Exported {} {} windows for {} to {}",
                records.len(),
                table.as_str(),
                product,
                path.display()
            );
            written.push(path);
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MarketEvent, Side, TradeEvent};
    use crate::store::EventStore;
    use tempfile::tempdir;

    const MINUTE: i64 = 60_000;

    fn trade(id: i64, timestamp: i64, price: f64) -> MarketEvent {
        MarketEvent::Trade(TradeEvent {
            trade_id: id,
            product_id: "BTC-USD".to_string(),
            side: Side::Buy,
            price,
            size: 1.0,
            timestamp,
        })
    }

    fn seeded_config(
        dir: &std::path::Path,
        events: &[MarketEvent],
        products: &[&str],
    ) -> FeaturesConfig {
        let db_path = dir.join("events.db").to_string_lossy().to_string();
        let mut store = EventStore::open(&db_path).unwrap();
        store.insert_batch(events).unwrap();
        FeaturesConfig {
            db_path,
            products: products.iter().map(|p| p.to_string()).collect(),
            workers: 2,
            chunk_size: 2,
        }
    }

    #[tokio::test]
    async fn test_series_covers_every_window_in_order() {
        let dir = tempdir().unwrap();
        // One trade per 10min window across [0, 60min)
        let events: Vec<MarketEvent> = (0..6)
            .map(|i| trade(i, i * 10 * MINUTE, 100.0 + i as f64))
            .collect();
        let config = seeded_config(dir.path(), &events, &["BTC-USD"]);

        let windows = plan(0, 60 * MINUTE, 10 * MINUTE, 100, Category::Trades).unwrap();
        assert_eq!(windows.len(), 6);

        let records = extract_series(&config, "BTC-USD", Table::Trades, &windows).await;
        assert_eq!(records.len(), 6);
        for (record, window) in records.iter().zip(&windows) {
            assert_eq!(record.window, *window);
        }
        // Each window holds exactly its own trade
        let buy_idx = table_columns(Table::Trades)
            .iter()
            .position(|c| *c == "buy_count")
            .unwrap();
        for record in &records {
            assert_eq!(record.values[buy_idx], 1.0);
        }
    }

    #[tokio::test]
    async fn test_empty_windows_still_produce_records() {
        let dir = tempdir().unwrap();
        let events = vec![trade(1, 5 * MINUTE, 100.0)];
        let config = seeded_config(dir.path(), &events, &["BTC-USD"]);

        let windows = plan(0, 30 * MINUTE, 10 * MINUTE, 100, Category::Trades).unwrap();
        let records = extract_series(&config, "BTC-USD", Table::Trades, &windows).await;

        assert_eq!(records.len(), 3);
        let mean_idx = table_columns(Table::Trades)
            .iter()
            .position(|c| *c == "price_mean")
            .unwrap();
        assert_eq!(records[0].values[mean_idx], 100.0);
        assert!(records[1].values[mean_idx].is_nan());
        assert!(records[2].values[mean_idx].is_nan());
    }

    #[tokio::test]
    async fn test_overlapping_windows_share_events() {
        let dir = tempdir().unwrap();
        let events = vec![trade(1, 12 * MINUTE, 100.0)];
        let config = seeded_config(dir.path(), &events, &["BTC-USD"]);

        // Stride 50 on 10min: starts at 0, 5, 10, 15, 20min
        let windows = plan(0, 30 * MINUTE, 10 * MINUTE, 50, Category::Trades).unwrap();
        assert_eq!(windows.len(), 5);

        let records = extract_series(&config, "BTC-USD", Table::Trades, &windows).await;
        let buy_idx = table_columns(Table::Trades)
            .iter()
            .position(|c| *c == "buy_count")
            .unwrap();
        let counts: Vec<f64> = records.iter().map(|r| r.values[buy_idx]).collect();
        // 12min falls inside [5,15) and [10,20)
        assert_eq!(counts, vec![0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_run_extraction_writes_one_file_per_product() {
        let dir = tempdir().unwrap();
        let mut events: Vec<MarketEvent> = (0..4)
            .map(|i| trade(i, i * MINUTE, 50.0))
            .collect();
        events.push(MarketEvent::Trade(TradeEvent {
            trade_id: 1,
            product_id: "ETH-USD".to_string(),
            side: Side::Sell,
            price: 2_000.0,
            size: 0.5,
            timestamp: MINUTE,
        }));
        let config = seeded_config(dir.path(), &events, &["BTC-USD", "ETH-USD"]);

        let out_dir = dir.path().join("out");
        let written = run_extraction(
            &config,
            Category::Trades,
            0,
            4 * MINUTE,
            2 * MINUTE,
            100,
            &out_dir,
        )
        .await
        .unwrap();

        assert_eq!(written.len(), 2);
        assert!(out_dir.join("trades_BTC-USD.csv").exists());
        assert!(out_dir.join("trades_ETH-USD.csv").exists());
    }

    #[tokio::test]
    async fn test_run_extraction_rejects_zero_stride() {
        let dir = tempdir().unwrap();
        let config = seeded_config(dir.path(), &[trade(1, 0, 1.0)], &["BTC-USD"]);
        let result = run_extraction(
            &config,
            Category::Trades,
            0,
            MINUTE,
            MINUTE,
            0,
            dir.path(),
        )
        .await;
        assert!(matches!(result, Err(ExtractError::Config(_))));
    }
}
