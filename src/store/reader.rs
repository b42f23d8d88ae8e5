//! Read-only store access for feature extraction.
//!
//! Each extraction worker opens its own reader so range queries never contend
//! on a shared connection. `query_only` keeps a misbehaving query from ever
//! taking a write lock while the scraper is live.

use crate::events::{OrderEvent, OrderKind, Side, TradeEvent};
use crate::store::pragma::apply_connection_pragmas;
use crate::store::StoreError;
use rusqlite::{params, Connection};
use std::path::Path;

pub struct EventReader {
    conn: Connection,
}

impl EventReader {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        apply_connection_pragmas(&conn)?;
        conn.pragma_update(None, "query_only", "ON")?;
        Ok(Self { conn })
    }

    /// Trades for one product with `start <= timestamp < end`, ordered by
    /// time (trade id breaks ties).
    pub fn trades_in_range(
        &self,
        product_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<TradeEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT trade_id, side, price, size, timestamp
             FROM trades
             WHERE product_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp ASC, trade_id ASC",
        )?;

        let rows = stmt.query_map(params![product_id, start, end], |row| {
            let side_str: String = row.get(1)?;
            let side = Side::from_str(&side_str).ok_or(rusqlite::Error::InvalidQuery)?;
            Ok(TradeEvent {
                trade_id: row.get(0)?,
                product_id: product_id.to_string(),
                side,
                price: row.get(2)?,
                size: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(row?);
        }
        Ok(trades)
    }

    /// Order events for one product with `start <= timestamp < end`, ordered
    /// by time (sequence breaks ties).
    pub fn orders_in_range(
        &self,
        product_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<OrderEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT exchange_sequence, side, price, remaining_size, event_type, timestamp
             FROM orders
             WHERE product_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp ASC, exchange_sequence ASC",
        )?;

        let rows = stmt.query_map(params![product_id, start, end], |row| {
            let side_str: String = row.get(1)?;
            let side = Side::from_str(&side_str).ok_or(rusqlite::Error::InvalidQuery)?;
            let kind_str: String = row.get(4)?;
            let kind = OrderKind::from_str(&kind_str).ok_or(rusqlite::Error::InvalidQuery)?;
            Ok(OrderEvent {
                exchange_sequence: row.get(0)?,
                product_id: product_id.to_string(),
                side,
                price: row.get(2)?,
                remaining_size: row.get(3)?,
                kind,
                timestamp: row.get(5)?,
            })
        })?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?);
        }
        Ok(orders)
    }

}
