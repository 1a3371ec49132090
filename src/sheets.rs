use std::collections::{HashMap, HashSet};

use google_sheets4::api::{BatchUpdateValuesRequest, ValueRange};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::SheetsHub;
use crate::error::{LedgerReadWarning, SyncError};
use crate::transform::{LedgerKey, LedgerRow};

const RANGE_PATTERN: &str = r"^[^!]+![A-Za-z]{1,3}[0-9]*:[A-Za-z]{1,3}[0-9]*$";

/// Checks `Tab!A1:F`-style range syntax before any API call sees it.
pub fn validate_range(range: &str) -> Result<(), SyncError> {
    static RANGE_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = RANGE_RE.get_or_init(|| Regex::new(RANGE_PATTERN).expect("range pattern compiles"));
    if re.is_match(range) {
        Ok(())
    } else {
        Err(SyncError::Configuration(format!(
            "range '{}' is not of the form Tab!A:B",
            range
        )))
    }
}

/// Tab name of a range like `Daily!A:F`.
fn range_tab(range: &str) -> &str {
    range.split('!').next().unwrap_or(range)
}

fn cell_str(row: &[Value], idx: usize) -> Option<String> {
    let cell = row.get(idx)?;
    let text = match cell {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

async fn get_values(
    hub: &SheetsHub,
    spreadsheet_id: &str,
    range: &str,
) -> Result<Vec<Vec<Value>>, String> {
    debug!("Fetching range {} from spreadsheet {}", range, spreadsheet_id);
    match hub
        .spreadsheets()
        .values_get(spreadsheet_id, range)
        .doit()
        .await
    {
        Ok((_, value_range)) => Ok(value_range.values.unwrap_or_default()),
        Err(e) => Err(e.to_string()),
    }
}

/// Loads the identity directory: `account_id -> account_name`. Duplicate id
/// rows resolve last-writer-wins.
pub async fn load_accounts(
    hub: &SheetsHub,
    spreadsheet_id: &str,
    range: &str,
) -> Result<HashMap<String, String>, SyncError> {
    let values = get_values(hub, spreadsheet_id, range)
        .await
        .map_err(|reason| {
            SyncError::Configuration(format!("identity directory read failed: {}", reason))
        })?;

    let directory = parse_directory_rows(&values)?;
    info!("Loaded {} accounts from identity directory", directory.len());
    Ok(directory)
}

/// Header row discarded; first two columns used, trimmed; rows missing either
/// value skipped. No usable row at all is a configuration error.
pub fn parse_directory_rows(values: &[Vec<Value>]) -> Result<HashMap<String, String>, SyncError> {
    if values.len() <= 1 {
        return Err(SyncError::Configuration(
            "identity directory has no data rows".to_string(),
        ));
    }

    let mut directory = HashMap::new();
    for row in &values[1..] {
        let id = cell_str(row, 0);
        let name = cell_str(row, 1);
        if let (Some(id), Some(name)) = (id, name) {
            directory.insert(id, name);
        }
    }

    if directory.is_empty() {
        return Err(SyncError::Configuration(
            "identity directory yielded no id/name pairs".to_string(),
        ));
    }
    Ok(directory)
}

/// Seeds the dedup set from the ledger's date/id columns. A failed read
/// degrades to an empty set plus a warning: the run continues treating every
/// fetched record as new.
pub async fn load_existing_keys(
    hub: &SheetsHub,
    spreadsheet_id: &str,
    range: &str,
) -> (HashSet<LedgerKey>, Option<LedgerReadWarning>) {
    match get_values(hub, spreadsheet_id, range).await {
        Ok(values) => {
            let keys = parse_key_rows(&values);
            info!("Seeded {} existing ledger keys", keys.len());
            (keys, None)
        }
        Err(reason) => {
            let warning = LedgerReadWarning { reason };
            warn!("{}", warning);
            (HashSet::new(), Some(warning))
        }
    }
}

pub fn parse_key_rows(values: &[Vec<Value>]) -> HashSet<LedgerKey> {
    let mut keys = HashSet::new();
    for row in values.iter().skip(1) {
        if let (Some(date), Some(account_id)) = (cell_str(row, 0), cell_str(row, 1)) {
            keys.insert((date, account_id));
        }
    }
    keys
}

/// Appends the batch after the last existing row of the ledger target.
/// An empty batch returns 0 without issuing any call.
pub async fn append_rows(
    hub: &SheetsHub,
    spreadsheet_id: &str,
    range: &str,
    account_id: &str,
    rows: Vec<LedgerRow>,
) -> Result<usize, SyncError> {
    if rows.is_empty() {
        debug!("No rows to append for {}", account_id);
        return Ok(0);
    }

    let count = rows.len();
    let req = ValueRange {
        values: Some(rows),
        ..Default::default()
    };

    let result = hub
        .spreadsheets()
        .values_append(req, spreadsheet_id, range)
        .value_input_option("RAW")
        .doit()
        .await;

    match result {
        Ok((_, response)) => {
            let updated = response
                .updates
                .and_then(|u| u.updated_rows)
                .unwrap_or(count as i32);
            debug!("Ledger reports {} rows updated", updated);
            Ok(count)
        }
        Err(e) => Err(SyncError::Persist {
            account_id: account_id.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Fills empty account-id cells in existing ledger rows by inverting the
/// directory to name -> id (duplicate names: last writer wins). One batch
/// update; rows with no date, an id already present, no name, or an unknown
/// name are left alone.
pub async fn backfill_account_ids(
    hub: &SheetsHub,
    spreadsheet_id: &str,
    ledger_range: &str,
    directory: &HashMap<String, String>,
) -> anyhow::Result<usize> {
    let values = get_values(hub, spreadsheet_id, ledger_range)
        .await
        .map_err(|reason| anyhow::anyhow!("ledger read failed: {}", reason))?;

    let name_to_id: HashMap<&str, &str> = directory
        .iter()
        .map(|(id, name)| (name.as_str(), id.as_str()))
        .collect();

    let tab = range_tab(ledger_range);
    let updates = plan_backfill(&values, &name_to_id, tab);
    if updates.is_empty() {
        info!("No ledger rows need an account id backfilled");
        return Ok(0);
    }

    let count = updates.len();
    let req = BatchUpdateValuesRequest {
        value_input_option: Some("RAW".to_string()),
        data: Some(updates),
        ..Default::default()
    };

    hub.spreadsheets()
        .values_batch_update(req, spreadsheet_id)
        .doit()
        .await
        .map_err(|e| anyhow::anyhow!("ledger batch update rejected: {}", e))?;

    info!("Backfilled account ids into {} ledger rows", count);
    Ok(count)
}

/// Ledger layout is [date, account_id, account_name, ...]; the id column is B.
fn plan_backfill(
    values: &[Vec<Value>],
    name_to_id: &HashMap<&str, &str>,
    tab: &str,
) -> Vec<ValueRange> {
    let mut updates = Vec::new();
    for (i, row) in values.iter().enumerate().skip(1) {
        let sheet_row = i + 1;
        if cell_str(row, 0).is_none() || cell_str(row, 1).is_some() {
            continue;
        }
        let Some(name) = cell_str(row, 2) else {
            continue;
        };
        let Some(id) = name_to_id.get(name.as_str()) else {
            debug!("Row {}: name '{}' not in directory, skipping", sheet_row, name);
            continue;
        };
        updates.push(ValueRange {
            range: Some(format!("{}!B{}", tab, sheet_row)),
            values: Some(vec![vec![json!(id)]]),
            ..Default::default()
        });
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{authenticator, StoredCredential};
    use google_sheets4::{hyper, hyper_rustls, Sheets};

    fn row(cells: &[Value]) -> Vec<Value> {
        cells.to_vec()
    }

    #[test]
    fn range_syntax() {
        assert!(validate_range("Daily!A:F").is_ok());
        assert!(validate_range("Accounts!A2:B100").is_ok());
        assert!(validate_range("Daily").is_err());
        assert!(validate_range("Daily!A").is_err());
    }

    #[test]
    fn directory_skips_header_and_incomplete_rows() {
        let values = vec![
            row(&[json!("account_id"), json!("account_name")]),
            row(&[json!(" UC1 "), json!("Alpha")]),
            row(&[json!("UC2")]),
            row(&[json!(""), json!("NoId")]),
            row(&[json!("UC3"), json!("Gamma")]),
        ];
        let directory = parse_directory_rows(&values).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory["UC1"], "Alpha");
        assert_eq!(directory["UC3"], "Gamma");
    }

    #[test]
    fn directory_with_header_only_is_an_error() {
        let values = vec![row(&[json!("account_id"), json!("account_name")])];
        assert!(matches!(
            parse_directory_rows(&values).unwrap_err(),
            SyncError::Configuration(_)
        ));
    }

    #[test]
    fn directory_duplicate_id_last_writer_wins() {
        let values = vec![
            row(&[json!("account_id"), json!("account_name")]),
            row(&[json!("UC1"), json!("Old")]),
            row(&[json!("UC1"), json!("New")]),
        ];
        let directory = parse_directory_rows(&values).unwrap();
        assert_eq!(directory["UC1"], "New");
    }

    #[test]
    fn key_rows_skip_header_and_short_rows() {
        let values = vec![
            row(&[json!("date"), json!("account_id")]),
            row(&[json!("2025-12-01"), json!("UC1")]),
            row(&[json!("2025-12-02")]),
        ];
        let keys = parse_key_rows(&values);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&("2025-12-01".to_string(), "UC1".to_string())));
    }

    #[test]
    fn backfill_targets_only_unfilled_named_rows() {
        let mut name_to_id = HashMap::new();
        name_to_id.insert("Alpha", "UC1");
        let values = vec![
            row(&[json!("date"), json!("account_id"), json!("account_name")]),
            row(&[json!("2025-12-01"), json!(""), json!("Alpha")]),
            row(&[json!("2025-12-02"), json!("UC1"), json!("Alpha")]),
            row(&[json!("2025-12-03"), json!(""), json!("Unknown")]),
        ];
        let updates = plan_backfill(&values, &name_to_id, "Daily");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].range.as_deref(), Some("Daily!B2"));
        assert_eq!(updates[0].values, Some(vec![vec![json!("UC1")]]));
    }

    async fn offline_hub() -> SheetsHub {
        let credential = StoredCredential {
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            refresh_token: "r".to_string(),
            account_id: None,
        };
        let auth = authenticator(credential, "test").await.unwrap();
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .expect("load native TLS root certificates")
            .https_or_http()
            .enable_http1()
            .build();
        let client = hyper::Client::builder().build::<_, hyper::Body>(https);
        Sheets::new(client, auth)
    }

    #[tokio::test]
    async fn empty_batch_appends_nothing_and_issues_no_call() {
        let hub = offline_hub().await;
        // Dummy credentials: any real API call would fail, so Ok(0) proves
        // the guard returned before reaching the network.
        let appended = append_rows(&hub, "sheet-1", "Daily!A:F", "UC1", Vec::new())
            .await
            .unwrap();
        assert_eq!(appended, 0);
    }
}
