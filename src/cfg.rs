use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::{debug, info};

use crate::args::Args;
use crate::dates::RangeMode;
use crate::error::SyncError;
use crate::sheets;

/// Immutable run configuration, assembled once from the config file, the
/// `LEDGER_SYNC_*` environment and command-line overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct Cfg {
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Env var holding the authorized-user credential JSON used for all
    /// sheet reads and writes.
    #[serde(default)]
    pub sheets_credentials_env: String,

    /// Currency the metrics source reports revenue in.
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub accounts: Vec<AccountEntry>,

    #[serde(default)]
    pub ranges: Ranges,

    #[serde(default)]
    pub dates: DatesConfig,

    /// Optional local CSV mirror of rows actually appended to the ledger.
    #[serde(default)]
    pub audit_csv: Option<AuditCsvConfig>,

    #[serde(skip)]
    pub dry_run: bool,
}

/// One synced account: the stable id paired explicitly with the env var that
/// carries its credential. The pairing is validated, never positional.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountEntry {
    pub id: String,
    pub credentials_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Ranges {
    /// Identity directory rows: [account_id, account_name, ...]
    #[serde(default = "default_directory_range")]
    pub directory: String,

    /// Ledger key columns: [date, account_id, ...]
    #[serde(default = "default_ledger_keys_range")]
    pub ledger_keys: String,

    /// Full ledger width, also the append target.
    #[serde(default = "default_ledger_append_range")]
    pub ledger_append: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatesConfig {
    #[serde(default = "default_mode")]
    pub mode: RangeMode,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditCsvConfig {
    pub path: String,
    #[serde(default = "default_true")]
    pub ensure: bool,
}

fn default_currency() -> String {
    "KRW".to_string()
}

fn default_directory_range() -> String {
    "Accounts!A:B".to_string()
}

fn default_ledger_keys_range() -> String {
    "Daily!A:B".to_string()
}

fn default_ledger_append_range() -> String {
    "Daily!A:F".to_string()
}

fn default_mode() -> RangeMode {
    RangeMode::ThisMonth
}

fn default_true() -> bool {
    true
}

impl Default for Ranges {
    fn default() -> Self {
        Self {
            directory: default_directory_range(),
            ledger_keys: default_ledger_keys_range(),
            ledger_append: default_ledger_append_range(),
        }
    }
}

impl Default for DatesConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            start: None,
            end: None,
        }
    }
}

impl Cfg {
    pub fn load(args: Args) -> Result<Self> {
        info!("Loading configuration from: {}", args.config);

        let builder = Config::builder()
            .add_source(File::with_name(&args.config).required(false))
            .add_source(Environment::with_prefix("LEDGER_SYNC").separator("__"));

        let mut cfg: Cfg = builder.build()?.try_deserialize()?;

        // Command-line overrides win over file and environment.
        if let Some(spreadsheet_id) = args.spreadsheet_id {
            debug!("Overriding spreadsheet_id from command line");
            cfg.spreadsheet_id = spreadsheet_id;
        }
        if let Some(mode) = args.mode {
            debug!("Overriding date mode from command line");
            cfg.dates.mode = RangeMode::parse(&mode)?;
        }
        if let Some(start) = args.start {
            cfg.dates.start = Some(start);
        }
        if let Some(end) = args.end {
            cfg.dates.end = Some(end);
        }
        cfg.dry_run = args.dry_run;

        debug!("Final configuration: {:?}", cfg);
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.spreadsheet_id.is_empty() {
            return Err(SyncError::Configuration(
                "spreadsheet_id must be set".to_string(),
            ));
        }
        if self.sheets_credentials_env.is_empty() {
            return Err(SyncError::Configuration(
                "sheets_credentials_env must be set".to_string(),
            ));
        }
        if self.accounts.is_empty() {
            return Err(SyncError::Configuration(
                "at least one [[accounts]] entry is required".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &self.accounts {
            if entry.id.is_empty() || entry.credentials_env.is_empty() {
                return Err(SyncError::Configuration(
                    "every account entry needs both id and credentials_env".to_string(),
                ));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(SyncError::Configuration(format!(
                    "account id {} configured more than once",
                    entry.id
                )));
            }
        }

        sheets::validate_range(&self.ranges.directory)?;
        sheets::validate_range(&self.ranges.ledger_keys)?;
        sheets::validate_range(&self.ranges.ledger_append)?;

        if self.dates.mode == RangeMode::Explicit
            && (self.dates.start.is_none() || self.dates.end.is_none())
        {
            return Err(SyncError::Configuration(
                "explicit date mode requires dates.start and dates.end".to_string(),
            ));
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(raw: &str) -> Cfg {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const MINIMAL: &str = r#"
        spreadsheet_id = "sheet-1"
        sheets_credentials_env = "SHEETS_CREDS"

        [[accounts]]
        id = "UC1"
        credentials_env = "CREDS_UC1"
    "#;

    #[test]
    fn minimal_config_validates_with_defaults() {
        let cfg = from_toml(MINIMAL);
        cfg.validate().unwrap();
        assert_eq!(cfg.ranges.directory, "Accounts!A:B");
        assert_eq!(cfg.ranges.ledger_append, "Daily!A:F");
        assert_eq!(cfg.currency, "KRW");
        assert_eq!(cfg.dates.mode, RangeMode::ThisMonth);
    }

    #[test]
    fn missing_spreadsheet_id_is_rejected() {
        let cfg = from_toml(
            r#"
            sheets_credentials_env = "SHEETS_CREDS"
            [[accounts]]
            id = "UC1"
            credentials_env = "CREDS_UC1"
        "#,
        );
        assert!(matches!(
            cfg.validate().unwrap_err(),
            SyncError::Configuration(_)
        ));
    }

    #[test]
    fn duplicate_account_ids_are_rejected() {
        let cfg = from_toml(
            r#"
            spreadsheet_id = "sheet-1"
            sheets_credentials_env = "SHEETS_CREDS"
            [[accounts]]
            id = "UC1"
            credentials_env = "A"
            [[accounts]]
            id = "UC1"
            credentials_env = "B"
        "#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_mode_requires_both_dates() {
        let cfg = from_toml(
            r#"
            spreadsheet_id = "sheet-1"
            sheets_credentials_env = "SHEETS_CREDS"
            [dates]
            mode = "explicit"
            start = "2025-12-01"
            [[accounts]]
            id = "UC1"
            credentials_env = "CREDS_UC1"
        "#,
        );
        assert!(cfg.validate().is_err());
    }
}
