//! Market data capture and feature extraction for crypto order flow.
//!
//! Two halves: `scraper_core` ingests exchange feed events into SQLite
//! through a buffered, crash-safe daemon, and `features_core` replays the
//! stored log through windowed metric policies into CSV series.

pub mod config;
pub mod events;
pub mod features_core;
pub mod lifecycle;
pub mod scraper_core;
pub mod store;
