use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::auth::{self, SheetsHub};
use crate::cfg::{AccountEntry, Cfg};
use crate::csv_sink;
use crate::dates;
use crate::error::{LedgerReadWarning, SyncError};
use crate::metrics;
use crate::sheets;
use crate::transform::{reconcile, LedgerKey};

#[derive(Debug, Default)]
pub struct RunSummary {
    pub accounts_processed: usize,
    pub accounts_skipped_no_credentials: usize,
    pub total_rows_added: usize,
    pub total_rows_skipped: usize,
    pub errors: Vec<AccountError>,
    pub ledger_warning: Option<LedgerReadWarning>,
}

#[derive(Debug)]
pub struct AccountError {
    pub account_id: String,
    pub error: SyncError,
}

/// One full sync pass. A single account's failure is recorded and the run
/// moves on; only configuration-level failures (directory unusable, date
/// range invalid) abort before any account work.
pub async fn run_sync(
    cfg: &Cfg,
    hub: &SheetsHub,
    http: &reqwest::Client,
    today: NaiveDate,
) -> Result<RunSummary, SyncError> {
    info!("Starting sync run");

    let (start, end) = dates::resolve(
        cfg.dates.mode,
        cfg.dates.start.as_deref(),
        cfg.dates.end.as_deref(),
        today,
    )?;
    info!("Date range: {} to {}", start, end);

    let directory = sheets::load_accounts(hub, &cfg.spreadsheet_id, &cfg.ranges.directory).await?;

    let (mut existing_keys, ledger_warning) =
        sheets::load_existing_keys(hub, &cfg.spreadsheet_id, &cfg.ranges.ledger_keys).await;

    let mut summary = RunSummary {
        ledger_warning,
        ..Default::default()
    };

    for entry in &cfg.accounts {
        match process_account(cfg, hub, http, &directory, &mut existing_keys, entry, start, end)
            .await
        {
            Ok(Some((added, skipped))) => {
                summary.accounts_processed += 1;
                summary.total_rows_added += added;
                summary.total_rows_skipped += skipped;
            }
            Ok(None) => {
                summary.accounts_skipped_no_credentials += 1;
            }
            Err(error) => {
                warn!("Account {} failed: {}", entry.id, error);
                summary.errors.push(AccountError {
                    account_id: entry.id.clone(),
                    error,
                });
            }
        }
    }

    log_summary(cfg, &summary);
    Ok(summary)
}

/// `Ok(None)` means the account had no credential material and was skipped.
/// `Ok(Some((added, skipped)))` is a completed account.
async fn process_account(
    cfg: &Cfg,
    hub: &SheetsHub,
    http: &reqwest::Client,
    directory: &HashMap<String, String>,
    existing_keys: &mut HashSet<LedgerKey>,
    entry: &AccountEntry,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Option<(usize, usize)>, SyncError> {
    info!("Processing account {}", entry.id);

    let account_name = directory.get(&entry.id).ok_or_else(|| SyncError::Configuration(
        format!("account {} is not in the identity directory", entry.id),
    ))?;

    let Some(credential) = auth::read_credential_env(&entry.credentials_env)? else {
        warn!(
            "Account {}: env var {} not set, skipping",
            entry.id, entry.credentials_env
        );
        return Ok(None);
    };

    // The credential may carry its own account id; a mismatch means the env
    // var holds the wrong channel's token.
    if let Some(ref claimed) = credential.account_id {
        if claimed != &entry.id {
            return Err(SyncError::Configuration(format!(
                "credential in {} claims account {} but is paired with {}",
                entry.credentials_env, claimed, entry.id
            )));
        }
    }

    let authenticator = auth::authenticator(credential, &entry.id).await?;
    let token = auth::analytics_token(&authenticator, &entry.id).await?;

    let records =
        metrics::fetch_records(http, &token, &entry.id, account_name, start, end, &cfg.currency)
            .await?;
    debug!("Account {}: {} records fetched", entry.id, records.len());

    let (new_rows, skipped) = reconcile(records, existing_keys);

    if cfg.dry_run {
        info!(
            "Account {} (dry run): would append {} rows, {} already present",
            entry.id,
            new_rows.len(),
            skipped
        );
        return Ok(Some((0, skipped)));
    }

    let added = sheets::append_rows(
        hub,
        &cfg.spreadsheet_id,
        &cfg.ranges.ledger_append,
        &entry.id,
        new_rows.clone(),
    )
    .await?;

    if added > 0 {
        if let Some(ref audit) = cfg.audit_csv {
            if let Err(e) = csv_sink::append(&audit.path, &new_rows, audit.ensure) {
                warn!("Audit CSV mirror failed: {}", e);
            }
        }
    }

    info!(
        "Account {} ({}): {} rows added, {} skipped",
        entry.id, account_name, added, skipped
    );
    Ok(Some((added, skipped)))
}

fn log_summary(cfg: &Cfg, summary: &RunSummary) {
    info!(
        "Run complete: {}/{} accounts processed, {} skipped without credentials, {} rows added, {} rows skipped",
        summary.accounts_processed,
        cfg.accounts.len(),
        summary.accounts_skipped_no_credentials,
        summary.total_rows_added,
        summary.total_rows_skipped
    );
    if let Some(ref warning) = summary.ledger_warning {
        warn!("{}", warning);
    }
    for err in &summary.errors {
        warn!("Account {}: {}", err.account_id, err.error);
    }
}
