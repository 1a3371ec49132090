use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dates::DATE_FORMAT;
use crate::error::SyncError;
use crate::transform::MetricRecord;

const REPORTS_URL: &str = "https://youtubeanalytics.googleapis.com/v2/reports";

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(default)]
    rows: Option<Vec<Vec<Value>>>,
}

/// One query per account covering the whole inclusive range, daily
/// granularity. No rows for the range is an empty result, not an error.
pub async fn fetch_records(
    http: &reqwest::Client,
    token: &str,
    account_id: &str,
    account_name: &str,
    start: NaiveDate,
    end: NaiveDate,
    currency: &str,
) -> Result<Vec<MetricRecord>, SyncError> {
    if start > end {
        return Err(SyncError::Configuration(format!(
            "fetch range start {} is after end {}",
            start, end
        )));
    }
    if account_id.is_empty() || account_name.is_empty() {
        return Err(SyncError::Configuration(
            "fetch requires a non-empty account id and name".to_string(),
        ));
    }

    let start_str = start.format(DATE_FORMAT).to_string();
    let end_str = end.format(DATE_FORMAT).to_string();
    debug!(
        "Querying metrics for {} ({}) from {} to {}",
        account_name, account_id, start_str, end_str
    );

    let response = http
        .get(REPORTS_URL)
        .query(&[
            ("ids", "channel==MINE"),
            ("startDate", start_str.as_str()),
            ("endDate", end_str.as_str()),
            ("metrics", "views,estimatedRevenue"),
            ("dimensions", "day"),
            ("currency", currency),
        ])
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| SyncError::SourceQuery {
            account_id: account_id.to_string(),
            reason: format!("request failed: {}", e),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::SourceQuery {
            account_id: account_id.to_string(),
            reason: format!("status {}: {}", status, body),
        });
    }

    let report: ReportResponse = response.json().await.map_err(|e| SyncError::SourceQuery {
        account_id: account_id.to_string(),
        reason: format!("unreadable response body: {}", e),
    })?;

    let rows = report.rows.unwrap_or_default();
    if rows.is_empty() {
        info!("{}: no metrics reported for {}..{}", account_name, start_str, end_str);
        return Ok(Vec::new());
    }

    Ok(map_report_rows(rows, account_id, account_name))
}

/// Report rows arrive as `[date, views, revenue]`; malformed rows are logged
/// and dropped.
fn map_report_rows(
    rows: Vec<Vec<Value>>,
    account_id: &str,
    account_name: &str,
) -> Vec<MetricRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let date = row.get(0).and_then(Value::as_str);
        let views = row.get(1).and_then(Value::as_f64);
        let revenue = row.get(2).and_then(Value::as_f64);
        match (date, views, revenue) {
            (Some(date), Some(views), Some(revenue)) if views >= 0.0 => {
                records.push(MetricRecord::new(
                    date.to_string(),
                    account_id.to_string(),
                    account_name.to_string(),
                    views as u64,
                    revenue,
                ));
            }
            _ => warn!("{}: dropping malformed report row {:?}", account_name, row),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_rows_map_to_records() {
        let rows = vec![
            vec![json!("2025-12-01"), json!(1000), json!(5.0)],
            vec![json!("2025-12-02"), json!(0), json!(0.0)],
        ];
        let records = map_report_rows(rows, "UC1", "Alpha");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, "2025-12-01");
        assert_eq!(records[0].views, 1000);
        assert_eq!(records[0].revenue, 5);
        assert_eq!(records[0].rpm, 5.0);
        assert_eq!(records[1].views, 0);
        assert_eq!(records[1].rpm, 0.0);
    }

    #[test]
    fn malformed_rows_are_dropped() {
        let rows = vec![
            vec![json!("2025-12-01")],
            vec![json!(42), json!(1), json!(1.0)],
            vec![json!("2025-12-03"), json!(10), json!(2.4)],
        ];
        let records = map_report_rows(rows, "UC1", "Alpha");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "2025-12-03");
        assert_eq!(records[0].revenue, 2);
    }

    #[test]
    fn fractional_revenue_rounds_to_whole_units() {
        let rows = vec![vec![json!("2025-12-01"), json!(987), json!(1233.7)]];
        let records = map_report_rows(rows, "UC1", "Alpha");
        assert_eq!(records[0].revenue, 1234);
        assert_eq!(records[0].rpm, 1250.3);
    }
}
