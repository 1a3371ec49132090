use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::debug;

/// Uniqueness key for a stored ledger row: `(date, account_id)`.
/// No other column takes part in duplicate detection.
pub type LedgerKey = (String, String);

/// One row as written to the ledger, cells carrying their literal JSON types.
pub type LedgerRow = Vec<Value>;

pub const LEDGER_COLUMNS: [&str; 6] = [
    "date",
    "account_id",
    "account_name",
    "views",
    "revenue",
    "rpm",
];

/// One day of metrics for one account, as reported by the metrics source.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// ISO-8601 calendar date, kept as the string the source reported.
    pub date: String,
    pub account_id: String,
    pub account_name: String,
    pub views: u64,
    /// Rounded to the nearest whole currency unit.
    pub revenue: i64,
    /// Revenue per thousand views, one decimal. 0.0 when views is 0.
    pub rpm: f64,
}

impl MetricRecord {
    pub fn new(
        date: String,
        account_id: String,
        account_name: String,
        views: u64,
        revenue_raw: f64,
    ) -> Self {
        let revenue = revenue_raw.round() as i64;
        let rpm = rpm(revenue, views);
        Self {
            date,
            account_id,
            account_name,
            views,
            revenue,
            rpm,
        }
    }

    pub fn key(&self) -> LedgerKey {
        (self.date.clone(), self.account_id.clone())
    }

    pub fn to_ledger_row(&self) -> LedgerRow {
        vec![
            json!(self.date),
            json!(self.account_id),
            json!(self.account_name),
            json!(self.views),
            json!(self.revenue),
            json!(self.rpm),
        ]
    }
}

/// Revenue per mille, rounded to one decimal. Revenue is already whole-unit
/// rounded before this is applied.
pub fn rpm(revenue: i64, views: u64) -> f64 {
    if views == 0 {
        return 0.0;
    }
    let raw = revenue as f64 / views as f64 * 1000.0;
    (raw * 10.0).round() / 10.0
}

/// Single order-preserving pass over `records`: rows whose key is already in
/// `existing_keys` are counted and dropped, the rest become ledger rows and
/// their keys join the set so a later duplicate within the same batch is also
/// caught.
pub fn reconcile(
    records: Vec<MetricRecord>,
    existing_keys: &mut HashSet<LedgerKey>,
) -> (Vec<LedgerRow>, usize) {
    let mut new_rows = Vec::new();
    let mut skipped = 0usize;

    for record in records {
        let key = record.key();
        if existing_keys.contains(&key) {
            debug!(
                "Skipping existing row: {} / {}",
                record.date, record.account_id
            );
            skipped += 1;
            continue;
        }
        new_rows.push(record.to_ledger_row());
        existing_keys.insert(key);
    }

    (new_rows, skipped)
}
