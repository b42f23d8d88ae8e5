//! Trade metric policy: side counts, traded volumes and price statistics.

use crate::events::{Side, TradeEvent};
use crate::features_core::{population_stats, round8, FeatureSet};

const COLUMNS: &[&str] = &[
    "buy_count",
    "sell_count",
    "total_buy_volume",
    "total_sell_volume",
    "price_mean",
    "price_std",
    "price_movement",
];

pub struct TradeFeatures;

impl FeatureSet for TradeFeatures {
    type Event = TradeEvent;

    fn columns(&self) -> &'static [&'static str] {
        COLUMNS
    }

    /// Expects `trades` ordered oldest first, the order the reader returns.
    fn compute(&self, trades: &[TradeEvent]) -> Vec<f64> {
        let buy_count = trades.iter().filter(|t| t.side == Side::Buy).count();
        let sell_count = trades.len() - buy_count;

        let total_buy_volume: f64 = trades
            .iter()
            .filter(|t| t.side == Side::Buy)
            .map(|t| t.size)
            .sum();
        let total_sell_volume: f64 = trades
            .iter()
            .filter(|t| t.side == Side::Sell)
            .map(|t| t.size)
            .sum();

        let prices: Vec<f64> = trades.iter().map(|t| t.price).collect();
        let (price_mean, price_std) = population_stats(&prices);

        // Oldest price minus latest: positive when the price fell
        let price_movement = match (trades.first(), trades.last()) {
            (Some(oldest), Some(latest)) => round8(oldest.price - latest.price),
            _ => f64::NAN,
        };

        vec![
            buy_count as f64,
            sell_count as f64,
            round8(total_buy_volume),
            round8(total_sell_volume),
            price_mean,
            price_std,
            price_movement,
        ]
    }
}
