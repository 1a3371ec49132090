use google_sheets4::{hyper, hyper_rustls, Sheets};
use serde::Deserialize;
use tracing::{debug, info};
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::authorized_user::AuthorizedUserSecret;
use yup_oauth2::{
    AuthorizedUserAuthenticator, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
};

use crate::error::SyncError;

pub const ANALYTICS_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/yt-analytics.readonly";
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

pub type HttpsConnector = hyper_rustls::HttpsConnector<hyper::client::HttpConnector>;
pub type SheetsHub = Sheets<HttpsConnector>;

/// Authorized-user credential JSON as stored in an env var. Extra fields from
/// the provider's token dump are ignored. `account_id` is optional; when
/// present it must match the account the credential is configured for.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredCredential {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Reads a credential from the named env var. An unset var is `Ok(None)` so
/// the caller can skip the account; a set-but-unparsable var is a
/// configuration error.
pub fn read_credential_env(var: &str) -> Result<Option<StoredCredential>, SyncError> {
    let raw = match std::env::var(var) {
        Ok(raw) => raw,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(SyncError::Configuration(format!(
                "env var {} is unreadable: {}",
                var, e
            )))
        }
    };

    let credential: StoredCredential = serde_json::from_str(&raw).map_err(|e| {
        SyncError::Configuration(format!("env var {} is not valid credential JSON: {}", var, e))
    })?;
    Ok(Some(credential))
}

/// Builds the refresh-token authenticator for one credential. Token refresh on
/// expiry is handled inside; a credential that cannot be refreshed surfaces as
/// an error from the first `token()` call.
pub async fn authenticator(
    credential: StoredCredential,
    account_id: &str,
) -> Result<Authenticator<HttpsConnector>, SyncError> {
    let secret = AuthorizedUserSecret {
        client_id: credential.client_id,
        client_secret: credential.client_secret,
        refresh_token: credential.refresh_token,
        key_type: "authorized_user".to_string(),
    };

    AuthorizedUserAuthenticator::builder(secret)
        .build()
        .await
        .map_err(|e| SyncError::Auth {
            account_id: account_id.to_string(),
            reason: format!("failed to build authenticator: {}", e),
        })
}

/// Bearer token for the metrics source, refreshed if needed.
pub async fn analytics_token(
    auth: &Authenticator<HttpsConnector>,
    account_id: &str,
) -> Result<String, SyncError> {
    let token = auth
        .token(&[ANALYTICS_READONLY_SCOPE])
        .await
        .map_err(|e| SyncError::Auth {
            account_id: account_id.to_string(),
            reason: format!("token refresh failed: {}", e),
        })?;

    token
        .token()
        .map(str::to_owned)
        .ok_or_else(|| SyncError::Auth {
            account_id: account_id.to_string(),
            reason: "token response carried no access token".to_string(),
        })
}

pub async fn sheets_hub(credential: StoredCredential) -> Result<SheetsHub, SyncError> {
    info!("Initializing Google Sheets client");

    let auth = authenticator(credential, "sheets").await?;

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .expect("load native TLS root certificates")
        .https_or_http()
        .enable_http1()
        .build();
    let client = hyper::Client::builder().build::<_, hyper::Body>(https);

    Ok(Sheets::new(client, auth))
}

/// Interactive installed-app flow for one account. Persists the token store
/// under `tokens/<account_id>.json` and forces a token fetch so a bad client
/// secret fails here rather than on the first sync.
pub async fn run_authorize_flow(account_id: &str, client_secret_path: &str) -> anyhow::Result<()> {
    info!(
        "Starting authorization for account {} using {}",
        account_id, client_secret_path
    );

    let app_secret = yup_oauth2::read_application_secret(client_secret_path).await?;

    let token_path = format!("tokens/{}.json", account_id);
    if let Some(parent) = std::path::Path::new(&token_path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let auth = InstalledFlowAuthenticator::builder(app_secret, InstalledFlowReturnMethod::HTTPRedirect)
        .persist_tokens_to_disk(&token_path)
        .build()
        .await?;

    let token = auth
        .token(&[ANALYTICS_READONLY_SCOPE, SHEETS_SCOPE])
        .await?;
    debug!("Token obtained, expires at {:?}", token.expiration_time());

    info!(
        "Authorization complete for {}. Token store written to {}",
        account_id, token_path
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_env_var_means_skip() {
        assert!(read_credential_env("LEDGER_SYNC_TEST_UNSET_VAR")
            .unwrap()
            .is_none());
    }

    #[test]
    fn credential_json_parses_with_optional_account_id() {
        std::env::set_var(
            "LEDGER_SYNC_TEST_CRED",
            r#"{"client_id":"c","client_secret":"s","refresh_token":"r","account_id":"UC1"}"#,
        );
        let cred = read_credential_env("LEDGER_SYNC_TEST_CRED").unwrap().unwrap();
        assert_eq!(cred.account_id.as_deref(), Some("UC1"));
        std::env::remove_var("LEDGER_SYNC_TEST_CRED");
    }

    #[test]
    fn malformed_credential_is_a_configuration_error() {
        std::env::set_var("LEDGER_SYNC_TEST_BAD_CRED", "not-json");
        let err = read_credential_env("LEDGER_SYNC_TEST_BAD_CRED").unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        std::env::remove_var("LEDGER_SYNC_TEST_BAD_CRED");
    }
}
