//! CSV export, one file per table and product.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat};

use crate::features_core::window::Table;
use crate::features_core::FeatureRecord;

fn format_instant(ms: i64) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

/// Write one feature series as `<table>_<product>.csv` under `out_dir`,
/// creating the directory if needed. An empty series still writes the
/// header so downstream loaders see the schema.
pub fn write_csv(
    out_dir: &Path,
    table: Table,
    product_id: &str,
    columns: &[&str],
    records: &[FeatureRecord],
) -> Result<PathBuf, std::io::Error> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{}_{}.csv", table.as_str(), product_id));
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);

    write!(writer, "start_time,end_time")?;
    for column in columns {
        write!(writer, ",{}", column)?;
    }
    writeln!(writer)?;

    for record in records {
        write!(
            writer,
            "{},{}",
            format_instant(record.window.start),
            format_instant(record.window.end)
        )?;
        for value in &record.values {
            write!(writer, ",{}", value)?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features_core::window::Window;
    use tempfile::tempdir;

    fn record(start: i64, end: i64, values: Vec<f64>) -> FeatureRecord {
        FeatureRecord {
            product_id: "BTC-USD".to_string(),
            table: Table::Trades,
            window: Window { start, end },
            values,
        }
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempdir().unwrap();
        let records = vec![
            record(0, 600_000, vec![2.0, 105.5]),
            record(600_000, 1_200_000, vec![0.0, f64::NAN]),
        ];

        let path = write_csv(
            dir.path(),
            Table::Trades,
            "BTC-USD",
            &["buy_count", "price_mean"],
            &records,
        )
        .unwrap();

        assert_eq!(path.file_name().unwrap(), "trades_BTC-USD.csv");
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "start_time,end_time,buy_count,price_mean");
        assert_eq!(
            lines[1],
            "1970-01-01T00:00:00.000Z,1970-01-01T00:10:00.000Z,2,105.5"
        );
        assert!(lines[2].ends_with(",0,NaN"));
    }

    #[test]
    fn test_empty_series_writes_header_only() {
        let dir = tempdir().unwrap();
        let path = write_csv(dir.path(), Table::Orders, "ETH-USD", &["open_count"], &[]).unwrap();

        assert_eq!(path.file_name().unwrap(), "orders_ETH-USD.csv");
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "start_time,end_time,open_count\n");
    }

    #[test]
    fn test_creates_missing_output_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("exports").join("today");
        let path = write_csv(&nested, Table::Trades, "BTC-USD", &["buy_count"], &[]).unwrap();
        assert!(path.exists());
    }
}
