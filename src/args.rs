use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ledger-sync")]
#[command(about = "Pull daily channel metrics and append deduplicated rows to a sheet ledger")]
#[command(version)]
pub struct Args {
    /// Path to config file
    #[arg(long, default_value = "config/config.toml")]
    pub config: String,

    /// Spreadsheet ID override
    #[arg(long, value_name = "SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    /// Date range mode override: this_month, last_month or explicit
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Range start for explicit mode (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: Option<String>,

    /// Range end for explicit mode (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub end: Option<String>,

    /// Fetch and reconcile but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Fill missing account-id cells in existing ledger rows, then exit
    #[arg(long)]
    pub backfill: bool,

    /// Run the OAuth installed-app flow for the given account id, then exit
    #[arg(long, value_name = "ACCOUNT_ID")]
    pub authorize: Option<String>,

    /// Client secret JSON used by --authorize
    #[arg(long, value_name = "PATH", default_value = "client_secret.json")]
    pub client_secret: String,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
