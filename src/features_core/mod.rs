//! Read path: planned windows → per-window event slices → feature records.
//!
//! ```text
//! EventReader (range query per chunk)
//!     ↓
//! Window slices (binary search on the sorted events)
//!     ↓
//! FeatureSet policy (trades.rs / orders.rs)
//!     ↓
//! FeatureRecord series → CSV per table and product
//! ```

pub mod exporter;
pub mod extractor;
pub mod orders;
pub mod trades;
pub mod window;

pub use exporter::write_csv;
pub use extractor::{extract_series, run_extraction, ExtractError};
pub use orders::OrderFeatures;
pub use trades::TradeFeatures;
pub use window::{parse_resolution, plan, Category, Table, Window};

/// A pluggable metric policy: reduces one window's events to a fixed list
/// of named values.
pub trait FeatureSet {
    type Event;

    /// Column names, in output order.
    fn columns(&self) -> &'static [&'static str];

    /// One value per column. An empty slice must still produce defined
    /// values (zero counts, NaN statistics).
    fn compute(&self, events: &[Self::Event]) -> Vec<f64>;
}

/// Metric columns for a table, matching the records `extract_series`
/// produces for it.
pub fn table_columns(table: Table) -> &'static [&'static str] {
    match table {
        Table::Orders => OrderFeatures.columns(),
        Table::Trades => TradeFeatures.columns(),
    }
}

/// One output row: the metrics of a single window. Never updated after
/// creation.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub product_id: String,
    pub table: Table,
    pub window: Window,
    /// Parallel to [`table_columns`] for `table`.
    pub values: Vec<f64>,
}

/// Metric values are reported to 8 decimal places.
pub(crate) fn round8(value: f64) -> f64 {
    if value.is_finite() {
        (value * 1e8).round() / 1e8
    } else {
        value
    }
}

/// Population mean and standard deviation (no Bessel's correction), NaN for
/// an empty slice.
pub(crate) fn population_stats(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (round8(mean), round8(variance.sqrt()))
}
