//! Integration tests for the ingestion daemon: feed payloads in, SQLite
//! rows out.
//!
//! A scripted transport stands in for the exchange websocket so the tests
//! can drive exact payload sequences through the real daemon:
//! - Batch flushing when the buffer fills
//! - Duplicate discard across a restart (gates reseeded from the store)
//! - Stop draining a partially filled buffer
//! - Reconnect after a dropped session, resuming ingestion
//! - Feed chatter counted without being stored

#[cfg(test)]
mod ingest_daemon_tests {
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;
    use tickflow::config::ScraperConfig;
    use tickflow::scraper_core::{Daemon, DaemonState, FeedTransport, TransportError};
    use tickflow::store::EventReader;
    use tokio::sync::{mpsc, watch};

    // 2024-03-01T00:00:00Z
    const BASE_MS: i64 = 1_709_251_200_000;

    /// Replays a fixed payload sequence, then either ends the feed or holds
    /// it open until the daemon stops listening.
    struct ScriptedFeed {
        payloads: Vec<String>,
        hold_open: bool,
    }

    #[async_trait]
    impl FeedTransport for ScriptedFeed {
        async fn run(&mut self, tx: mpsc::Sender<String>) -> Result<(), TransportError> {
            for payload in self.payloads.drain(..) {
                if tx.send(payload).await.is_err() {
                    return Ok(());
                }
            }
            if self.hold_open {
                tx.closed().await;
            }
            Ok(())
        }

        fn transport_type(&self) -> &'static str {
            "scripted"
        }
    }

    /// Delivers one payload batch per session and fails the session in
    /// between, the shape of a feed that keeps dropping the connection.
    struct FlakyFeed {
        sessions: Vec<Vec<String>>,
    }

    #[async_trait]
    impl FeedTransport for FlakyFeed {
        async fn run(&mut self, tx: mpsc::Sender<String>) -> Result<(), TransportError> {
            if self.sessions.is_empty() {
                return Ok(());
            }
            let payloads = self.sessions.remove(0);
            for payload in payloads {
                if tx.send(payload).await.is_err() {
                    return Ok(());
                }
            }
            if self.sessions.is_empty() {
                Ok(())
            } else {
                Err(TransportError::Protocol("connection reset".to_string()))
            }
        }

        fn transport_type(&self) -> &'static str {
            "flaky"
        }
    }

    fn test_config(dir: &std::path::Path, buffer_size: usize) -> ScraperConfig {
        ScraperConfig {
            db_path: dir.join("events.db").to_string_lossy().to_string(),
            ws_url: "wss://feed.invalid".to_string(),
            products: vec!["BTC-USD".to_string()],
            buffer_size,
            run_dir: dir.join("run"),
            store_retries: 1,
            stop_grace_secs: 5,
        }
    }

    fn feed_time(offset_ms: i64) -> String {
        chrono::DateTime::from_timestamp_millis(BASE_MS + offset_ms)
            .unwrap()
            .to_rfc3339()
    }

    fn order_payload(sequence: i64) -> String {
        json!({
            "type": "open",
            "sequence": sequence,
            "product_id": "BTC-USD",
            "side": if sequence % 2 == 0 { "buy" } else { "sell" },
            "price": "100.5",
            "remaining_size": "0.25",
            "time": feed_time(sequence * 10)
        })
        .to_string()
    }

    fn trade_payload(trade_id: i64) -> String {
        json!({
            "type": "match",
            "trade_id": trade_id,
            "product_id": "BTC-USD",
            "side": "sell",
            "price": "101.25",
            "size": "0.5",
            "time": feed_time(trade_id * 10)
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_full_buffers_flush_in_batches() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), 1000);
        let db_path = config.db_path.clone();

        let payloads: Vec<String> = (1i64..=2500).map(order_payload).collect();
        let transport = Box::new(ScriptedFeed {
            payloads,
            hold_open: false,
        });
        let (_stop_tx, stop_rx) = watch::channel(false);

        let report = Daemon::new(config).run(transport, stop_rx).await.unwrap();

        assert_eq!(report.final_state, DaemonState::Stopped);
        assert_eq!(report.admitted, 2500);
        // Two full buffers plus the final drain of 500
        assert_eq!(report.flush.batches, 3);
        assert_eq!(report.flush.events_flushed, 2500);
        assert_eq!(report.flush.events_dropped, 0);

        let reader = EventReader::open(&db_path).unwrap();
        let orders = reader.orders_in_range("BTC-USD", 0, i64::MAX).unwrap();
        assert_eq!(orders.len(), 2500, "every admitted event must be stored");
    }

    #[tokio::test]
    async fn test_replayed_events_discarded_after_restart() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), 1000);

        let first: Vec<String> = (1i64..=10).map(order_payload).collect();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let report = Daemon::new(config.clone())
            .run(
                Box::new(ScriptedFeed {
                    payloads: first.clone(),
                    hold_open: false,
                }),
                stop_rx,
            )
            .await
            .unwrap();
        assert_eq!(report.admitted, 10);

        // Second run replays the same ten and adds five new ones, the shape
        // of a reconnect replay
        let mut second = first;
        second.extend((11i64..=15).map(order_payload));
        let (_stop_tx, stop_rx) = watch::channel(false);
        let report = Daemon::new(config.clone())
            .run(
                Box::new(ScriptedFeed {
                    payloads: second,
                    hold_open: false,
                }),
                stop_rx,
            )
            .await
            .unwrap();

        assert_eq!(report.admitted, 5);
        assert_eq!(report.duplicates, 10);

        let reader = EventReader::open(&config.db_path).unwrap();
        let orders = reader.orders_in_range("BTC-USD", 0, i64::MAX).unwrap();
        assert_eq!(orders.len(), 15);
    }

    #[tokio::test]
    async fn test_stop_persists_partial_buffer() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), 1000);
        let db_path = config.db_path.clone();

        // 400 events never fill a 1000-slot buffer on their own
        let payloads: Vec<String> = (1i64..=400).map(order_payload).collect();
        let transport = Box::new(ScriptedFeed {
            payloads,
            hold_open: true,
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        let daemon = tokio::spawn(Daemon::new(config).run(transport, stop_rx));

        // Let the daemon ingest everything, then ask it to stop
        tokio::time::sleep(Duration::from_millis(500)).await;
        stop_tx.send(true).unwrap();

        let report = daemon.await.unwrap().unwrap();
        assert_eq!(report.final_state, DaemonState::Stopped);
        assert_eq!(report.admitted, 400);
        assert_eq!(report.flush.batches, 1);
        assert_eq!(report.flush.events_flushed, 400);

        let reader = EventReader::open(&db_path).unwrap();
        let orders = reader.orders_in_range("BTC-USD", 0, i64::MAX).unwrap();
        assert_eq!(orders.len(), 400, "drain must persist the partial buffer");
    }

    #[tokio::test]
    async fn test_dropped_session_reconnects_and_resumes() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), 1000);
        let db_path = config.db_path.clone();

        // Session one dies after 20 events; session two carries on from 21
        let sessions = vec![
            (1i64..=20).map(order_payload).collect(),
            (21i64..=30).map(order_payload).collect(),
        ];
        let transport = Box::new(FlakyFeed { sessions });
        let (_stop_tx, stop_rx) = watch::channel(false);

        let report = Daemon::new(config).run(transport, stop_rx).await.unwrap();

        assert_eq!(report.final_state, DaemonState::Stopped);
        assert_eq!(report.admitted, 30, "both sessions' events must land");
        assert_eq!(report.duplicates, 0);

        let reader = EventReader::open(&db_path).unwrap();
        let orders = reader.orders_in_range("BTC-USD", 0, i64::MAX).unwrap();
        assert_eq!(orders.len(), 30);
    }

    #[tokio::test]
    async fn test_feed_chatter_counted_not_stored() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), 1000);
        let db_path = config.db_path.clone();

        let payloads = vec![
            json!({ "type": "heartbeat" }).to_string(),
            json!({ "type": "received", "order_id": "x" }).to_string(),
            json!({ "type": "subscriptions" }).to_string(),
            "not json at all".to_string(),
            json!({ "type": "snapshot" }).to_string(),
            order_payload(1),
            trade_payload(1),
        ];
        let transport = Box::new(ScriptedFeed {
            payloads,
            hold_open: false,
        });
        let (_stop_tx, stop_rx) = watch::channel(false);

        let report = Daemon::new(config).run(transport, stop_rx).await.unwrap();

        assert_eq!(report.admitted, 2);
        assert_eq!(report.ignored, 3);
        assert_eq!(report.rejected, 2);

        let reader = EventReader::open(&db_path).unwrap();
        assert_eq!(
            reader.orders_in_range("BTC-USD", 0, i64::MAX).unwrap().len(),
            1
        );
        assert_eq!(
            reader.trades_in_range("BTC-USD", 0, i64::MAX).unwrap().len(),
            1
        );
    }
}
