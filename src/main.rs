use anyhow::Result;
use clap::Parser;
use tracing::info;

mod args;
mod auth;
mod cfg;
mod csv_sink;
mod dates;
mod error;
mod job;
mod metrics;
mod sheets;
mod transform;

use args::Args;
use cfg::Cfg;
use error::SyncError;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting ledger-sync");

    if let Some(account_id) = args.authorize.clone() {
        auth::run_authorize_flow(&account_id, &args.client_secret).await?;
        return Ok(());
    }

    let backfill = args.backfill;
    let cfg = Cfg::load(args)?;
    cfg.validate()?;

    let sheets_credential = auth::read_credential_env(&cfg.sheets_credentials_env)?
        .ok_or_else(|| {
            SyncError::Configuration(format!(
                "env var {} is not set",
                cfg.sheets_credentials_env
            ))
        })?;
    let hub = auth::sheets_hub(sheets_credential).await?;

    if backfill {
        let directory =
            sheets::load_accounts(&hub, &cfg.spreadsheet_id, &cfg.ranges.directory).await?;
        sheets::backfill_account_ids(
            &hub,
            &cfg.spreadsheet_id,
            &cfg.ranges.ledger_append,
            &directory,
        )
        .await?;
        return Ok(());
    }

    let http = reqwest::Client::new();
    let today = chrono::Local::now().date_naive();

    job::run_sync(&cfg, &hub, &http, today).await?;

    info!("ledger-sync completed");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level {
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt().with_max_level(filter).init();

    Ok(())
}
