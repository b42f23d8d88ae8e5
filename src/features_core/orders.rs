//! Order-event metric policy.
//!
//! Works on the raw event log, not a reconstructed book: bids are resting
//! buy orders, asks resting sells, and volumes sum the reported remaining
//! sizes inside the window.

use crate::events::{OrderEvent, OrderKind, Side};
use crate::features_core::{population_stats, round8, FeatureSet};

const COLUMNS: &[&str] = &[
    "open_count",
    "done_count",
    "change_count",
    "bid_count",
    "ask_count",
    "bid_volume",
    "ask_volume",
    "volume_imbalance",
    "price_mean",
    "price_std",
];

pub struct OrderFeatures;

impl FeatureSet for OrderFeatures {
    type Event = OrderEvent;

    fn columns(&self) -> &'static [&'static str] {
        COLUMNS
    }

    fn compute(&self, orders: &[OrderEvent]) -> Vec<f64> {
        let mut open_count = 0usize;
        let mut done_count = 0usize;
        let mut change_count = 0usize;
        for order in orders {
            match order.kind {
                OrderKind::Open => open_count += 1,
                OrderKind::Done => done_count += 1,
                OrderKind::Change => change_count += 1,
            }
        }

        let bid_count = orders.iter().filter(|o| o.side == Side::Buy).count();
        let ask_count = orders.len() - bid_count;

        let bid_volume: f64 = orders
            .iter()
            .filter(|o| o.side == Side::Buy)
            .map(|o| o.remaining_size)
            .sum();
        let ask_volume: f64 = orders
            .iter()
            .filter(|o| o.side == Side::Sell)
            .map(|o| o.remaining_size)
            .sum();

        let total_volume = bid_volume + ask_volume;
        let volume_imbalance = if total_volume > 0.0 {
            round8((bid_volume - ask_volume) / total_volume)
        } else {
            f64::NAN
        };

        let prices: Vec<f64> = orders.iter().map(|o| o.price).collect();
        let (price_mean, price_std) = population_stats(&prices);

        vec![
            open_count as f64,
            done_count as f64,
            change_count as f64,
            bid_count as f64,
            ask_count as f64,
            round8(bid_volume),
            round8(ask_volume),
            volume_imbalance,
            price_mean,
            price_std,
        ]
    }
}
