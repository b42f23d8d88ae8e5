//! Classification of raw feed payloads into validated market events.
//!
//! The feed serializes prices and sizes as decimal strings and identifiers as
//! JSON numbers; everything the storage schema needs must be present and
//! parseable or the payload is rejected. Classification is stateless, the
//! ordering and duplicate concerns live in the daemon's admission gate.

use crate::events::{MarketEvent, OrderEvent, OrderKind, Side, TradeEvent};
use chrono::DateTime;
use serde_json::Value;

/// Feed chatter that never becomes a stored event. Reported separately from
/// unknown types so the daemon can count it without warning noise.
const IGNORED_TYPES: &[&str] = &[
    "received",
    "activate",
    "subscriptions",
    "heartbeat",
    "last_match",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnknownType(String),
    IgnoredType(String),
    MissingField(&'static str),
    SchemaMismatch(&'static str),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::UnknownType(t) => write!(f, "unknown message type '{}'", t),
            Rejection::IgnoredType(t) => write!(f, "ignored message type '{}'", t),
            Rejection::MissingField(field) => write!(f, "missing field '{}'", field),
            Rejection::SchemaMismatch(field) => write!(f, "malformed field '{}'", field),
        }
    }
}

impl std::error::Error for Rejection {}

/// Parse a raw feed payload and classify it.
pub fn classify_text(payload: &str) -> Result<MarketEvent, Rejection> {
    let msg: Value =
        serde_json::from_str(payload).map_err(|_| Rejection::SchemaMismatch("payload"))?;
    classify(&msg)
}

pub fn classify(msg: &Value) -> Result<MarketEvent, Rejection> {
    let msg_type = msg
        .get("type")
        .ok_or(Rejection::MissingField("type"))?
        .as_str()
        .ok_or(Rejection::SchemaMismatch("type"))?;

    match msg_type {
        "match" => classify_match(msg),
        "open" => classify_order(msg, OrderKind::Open),
        "done" => classify_order(msg, OrderKind::Done),
        "change" => classify_order(msg, OrderKind::Change),
        other if IGNORED_TYPES.contains(&other) => Err(Rejection::IgnoredType(other.to_string())),
        other => Err(Rejection::UnknownType(other.to_string())),
    }
}

fn classify_match(msg: &Value) -> Result<MarketEvent, Rejection> {
    Ok(MarketEvent::Trade(TradeEvent {
        trade_id: id_field(msg, "trade_id")?,
        product_id: str_field(msg, "product_id")?.to_string(),
        side: side_field(msg)?,
        price: price_field(msg)?,
        size: decimal_field(msg, "size")?,
        timestamp: time_field(msg)?,
    }))
}

fn classify_order(msg: &Value, kind: OrderKind) -> Result<MarketEvent, Rejection> {
    Ok(MarketEvent::Order(OrderEvent {
        exchange_sequence: id_field(msg, "sequence")?,
        product_id: str_field(msg, "product_id")?.to_string(),
        side: side_field(msg)?,
        price: price_field(msg)?,
        remaining_size: decimal_field(msg, "remaining_size")?,
        kind,
        timestamp: time_field(msg)?,
    }))
}

fn str_field<'a>(msg: &'a Value, field: &'static str) -> Result<&'a str, Rejection> {
    msg.get(field)
        .ok_or(Rejection::MissingField(field))?
        .as_str()
        .ok_or(Rejection::SchemaMismatch(field))
}

/// Prices and sizes arrive as decimal strings ("6423.45000000").
fn decimal_field(msg: &Value, field: &'static str) -> Result<f64, Rejection> {
    let raw = str_field(msg, field)?;
    let value: f64 = raw.parse().map_err(|_| Rejection::SchemaMismatch(field))?;
    if !value.is_finite() || value < 0.0 {
        return Err(Rejection::SchemaMismatch(field));
    }
    Ok(value)
}

/// Prices must be strictly positive; sizes may be zero (a fully filled
/// `done` reports remaining_size "0").
fn price_field(msg: &Value) -> Result<f64, Rejection> {
    let price = decimal_field(msg, "price")?;
    if price == 0.0 {
        return Err(Rejection::SchemaMismatch("price"));
    }
    Ok(price)
}

fn id_field(msg: &Value, field: &'static str) -> Result<i64, Rejection> {
    msg.get(field)
        .ok_or(Rejection::MissingField(field))?
        .as_i64()
        .ok_or(Rejection::SchemaMismatch(field))
}

fn side_field(msg: &Value) -> Result<Side, Rejection> {
    let raw = str_field(msg, "side")?;
    Side::from_str(raw).ok_or(Rejection::SchemaMismatch("side"))
}

/// Feed timestamps are RFC 3339 with sub-second precision, stored as epoch
/// milliseconds.
fn time_field(msg: &Value) -> Result<i64, Rejection> {
    let raw = str_field(msg, "time")?;
    let parsed =
        DateTime::parse_from_rfc3339(raw).map_err(|_| Rejection::SchemaMismatch("time"))?;
    Ok(parsed.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn match_msg() -> Value {
        json!({
            "type": "match",
            "trade_id": 10,
            "sequence": 50,
            "product_id": "BTC-USD",
            "side": "sell",
            "price": "400.23",
            "size": "5.23512",
            "time": "2014-11-07T08:19:27.028459Z"
        })
    }

    fn open_msg() -> Value {
        json!({
            "type": "open",
            "sequence": 10,
            "product_id": "BTC-USD",
            "side": "sell",
            "price": "200.2",
            "remaining_size": "1.00",
            "time": "2014-11-07T08:19:27.028459Z"
        })
    }

    #[test]
    fn test_match_becomes_trade() {
        let event = classify(&match_msg()).unwrap();
        let trade = match event {
            MarketEvent::Trade(trade) => trade,
            other => panic!("expected trade, got {:?}", other),
        };

        assert_eq!(trade.trade_id, 10);
        assert_eq!(trade.product_id, "BTC-USD");
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.price, 400.23);
        assert_eq!(trade.size, 5.23512);

        let expected_ms = DateTime::parse_from_rfc3339("2014-11-07T08:19:27.028459Z")
            .unwrap()
            .timestamp_millis();
        assert_eq!(trade.timestamp, expected_ms);
    }

    #[test]
    fn test_order_kinds() {
        for (raw, kind) in [
            ("open", OrderKind::Open),
            ("done", OrderKind::Done),
            ("change", OrderKind::Change),
        ] {
            let mut msg = open_msg();
            msg["type"] = json!(raw);
            let event = classify(&msg).unwrap();
            match event {
                MarketEvent::Order(order) => {
                    assert_eq!(order.kind, kind);
                    assert_eq!(order.exchange_sequence, 10);
                    assert_eq!(order.remaining_size, 1.0);
                }
                other => panic!("expected order, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_ignored_types() {
        for raw in ["received", "activate", "subscriptions", "heartbeat"] {
            let msg = json!({ "type": raw });
            assert_eq!(
                classify(&msg),
                Err(Rejection::IgnoredType(raw.to_string()))
            );
        }
    }

    #[test]
    fn test_unknown_type() {
        let msg = json!({ "type": "snapshotty" });
        assert_eq!(
            classify(&msg),
            Err(Rejection::UnknownType("snapshotty".to_string()))
        );
    }

    #[test]
    fn test_missing_type() {
        assert_eq!(
            classify(&json!({ "product_id": "BTC-USD" })),
            Err(Rejection::MissingField("type"))
        );
    }

    #[test]
    fn test_missing_field() {
        let mut msg = match_msg();
        msg.as_object_mut().unwrap().remove("price");
        assert_eq!(classify(&msg), Err(Rejection::MissingField("price")));
    }

    #[test]
    fn test_malformed_price() {
        let mut msg = match_msg();
        msg["price"] = json!("not-a-price");
        assert_eq!(classify(&msg), Err(Rejection::SchemaMismatch("price")));

        msg["price"] = json!("-3.5");
        assert_eq!(classify(&msg), Err(Rejection::SchemaMismatch("price")));
    }

    #[test]
    fn test_priceless_done_rejected() {
        let msg = json!({
            "type": "done",
            "sequence": 11,
            "product_id": "BTC-USD",
            "side": "buy",
            "reason": "filled",
            "time": "2014-11-07T08:19:27.028459Z"
        });
        assert_eq!(classify(&msg), Err(Rejection::MissingField("price")));
    }

    #[test]
    fn test_malformed_time() {
        let mut msg = open_msg();
        msg["time"] = json!("yesterday");
        assert_eq!(classify(&msg), Err(Rejection::SchemaMismatch("time")));
    }

    #[test]
    fn test_non_json_payload() {
        assert_eq!(
            classify_text("not json at all"),
            Err(Rejection::SchemaMismatch("payload"))
        );
        assert!(classify_text(&match_msg().to_string()).is_ok());
    }
}
