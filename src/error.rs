use thiserror::Error;

/// Failure taxonomy for a sync run. `Configuration` aborts the run before any
/// account work; the per-account variants are recorded in the run summary and
/// the run moves on to the next account.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("credentials for account {account_id}: {reason}")]
    Auth { account_id: String, reason: String },

    #[error("metrics query for account {account_id}: {reason}")]
    SourceQuery { account_id: String, reason: String },

    #[error("ledger append for account {account_id}: {reason}")]
    Persist { account_id: String, reason: String },
}

/// Raised (not thrown) when the ledger's existing keys could not be read.
/// The run continues with an empty key set, which can re-add rows that are
/// already present; callers must surface this in the summary.
#[derive(Debug, Clone)]
pub struct LedgerReadWarning {
    pub reason: String,
}

impl std::fmt::Display for LedgerReadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ledger read failed, treating all rows as new: {}", self.reason)
    }
}
