//! Validated market events shared by the scraper and the feature extractor.
//!
//! Everything downstream of the validator works with these types; raw feed
//! JSON never crosses the validator boundary. Timestamps are Unix epoch
//! milliseconds (UTC).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Lifecycle stage of an order-book event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKind {
    Open,
    Done,
    Change,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Open => "open",
            OrderKind::Done => "done",
            OrderKind::Change => "change",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(OrderKind::Open),
            "done" => Some(OrderKind::Done),
            "change" => Some(OrderKind::Change),
            _ => None,
        }
    }
}

/// An order-book mutation (open / done / change) for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    /// Exchange-assigned sequence number, strictly increasing per product.
    pub exchange_sequence: i64,
    pub product_id: String,
    pub side: Side,
    pub price: f64,
    pub remaining_size: f64,
    pub kind: OrderKind,
    /// Epoch milliseconds, UTC.
    pub timestamp: i64,
}

/// An executed trade (a `match` on the feed) for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    /// Exchange-assigned trade id, strictly increasing per product.
    pub trade_id: i64,
    pub product_id: String,
    /// Side of the resting (maker) order.
    pub side: Side,
    pub price: f64,
    pub size: f64,
    /// Epoch milliseconds, UTC.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Order(OrderEvent),
    Trade(TradeEvent),
}

impl MarketEvent {
    pub fn product_id(&self) -> &str {
        match self {
            MarketEvent::Order(order) => &order.product_id,
            MarketEvent::Trade(trade) => &trade.product_id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            MarketEvent::Order(order) => order.timestamp,
            MarketEvent::Trade(trade) => trade.timestamp,
        }
    }
}
