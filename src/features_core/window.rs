//! Resolution grammar and window planning.
//!
//! A resolution string is one or more `<integer><unit>` groups (`d`, `h`,
//! `min`, `s`), e.g. `10min` or `2h40min`. Planning turns `[start, end)`
//! plus a resolution into the ordered series of aggregation windows.

use crate::config::ConfigError;

/// What the user asked to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Orders,
    Trades,
    All,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Orders => "orders",
            Category::Trades => "trades",
            Category::All => "all",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "orders" => Some(Category::Orders),
            "trades" => Some(Category::Trades),
            "all" => Some(Category::All),
            _ => None,
        }
    }

    /// Concrete tables this category extracts from.
    pub fn tables(&self) -> &'static [Table] {
        match self {
            Category::Orders => &[Table::Orders],
            Category::Trades => &[Table::Trades],
            Category::All => &[Table::Orders, Table::Trades],
        }
    }
}

/// A concrete event table, and the label used in output file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Orders,
    Trades,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Orders => "orders",
            Table::Trades => "trades",
        }
    }
}

/// Half-open aggregation interval, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    pub fn span(&self) -> i64 {
        self.end - self.start
    }
}

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Parse a resolution string into milliseconds.
pub fn parse_resolution(raw: &str) -> Result<i64, ConfigError> {
    let invalid = || ConfigError::InvalidValue(format!("invalid resolution '{}'", raw));

    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total_ms = 0i64;
    let mut chars = s.chars().peekable();

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                digits.push(*c);
                chars.next();
            } else {
                break;
            }
        }

        let mut unit = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(*c);
                chars.next();
            } else {
                break;
            }
        }

        let value: i64 = digits.parse().map_err(|_| invalid())?;
        let unit_ms = match unit.as_str() {
            "d" => MS_PER_DAY,
            "h" => MS_PER_HOUR,
            "min" => MS_PER_MINUTE,
            "s" => MS_PER_SECOND,
            _ => return Err(invalid()),
        };

        total_ms = value
            .checked_mul(unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(invalid)?;
    }

    if total_ms == 0 {
        return Err(invalid());
    }
    Ok(total_ms)
}

/// Window boundaries for one extraction run.
///
/// Orders (and the combined category) get contiguous windows, the last one
/// truncated at `end`. Trade windows keep their full span and advance by
/// `resolution * stride / 100`, overlapping when the stride is below 100.
/// An empty range plans an empty series.
pub fn plan(
    start: i64,
    end: i64,
    resolution_ms: i64,
    stride_pct: u8,
    category: Category,
) -> Result<Vec<Window>, ConfigError> {
    if stride_pct == 0 || stride_pct > 100 {
        return Err(ConfigError::InvalidValue(format!(
            "stride must be in (0, 100], got {}",
            stride_pct
        )));
    }
    if start >= end {
        return Ok(Vec::new());
    }

    let mut windows = Vec::new();
    match category {
        Category::Trades => {
            // Widened so an extreme resolution cannot overflow the multiply;
            // the step never exceeds the resolution, so it fits back in i64.
            // A sub-millisecond stride still has to advance.
            let step = ((resolution_ms as i128 * stride_pct as i128) / 100).max(1) as i64;
            let mut cursor = start;
            while let Some(span_end) = cursor.checked_add(resolution_ms) {
                if span_end > end {
                    break;
                }
                windows.push(Window {
                    start: cursor,
                    end: span_end,
                });
                cursor = match cursor.checked_add(step) {
                    Some(next) => next,
                    // Past the representable range, so past any end
                    None => break,
                };
            }
        }
        Category::Orders | Category::All => {
            let mut cursor = start;
            while cursor < end {
                match cursor.checked_add(resolution_ms) {
                    Some(span_end) => {
                        windows.push(Window {
                            start: cursor,
                            end: span_end.min(end),
                        });
                        cursor = span_end;
                    }
                    // An unrepresentable span certainly reaches `end`
                    None => {
                        windows.push(Window { start: cursor, end });
                        break;
                    }
                }
            }
        }
    }
    Ok(windows)
}
