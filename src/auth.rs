//! OAuth2 client-credentials authentication for Azure Resource Manager.
//!
//! Acquires bearer tokens from Azure AD's `/oauth2/v2.0/token` endpoint using
//! the client_credentials grant. The token is cached in `TokenProvider` and
//! refreshed on demand. `ArmClient` reads the cached token via `token()` and
//! calls `refresh_token()` when it is absent or stale.
//!
//! Both the global Azure cloud and Azure China are supported; they differ in
//! the authority host and in the management endpoint the token is scoped to.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Result, SweepError};

/// Azure AD v2.0 token endpoint. `{authority}` and `{tenant_id}` are
/// replaced at runtime.
const TOKEN_URL: &str = "https://{authority}/{tenant_id}/oauth2/v2.0/token";

/// Safety buffer subtracted from `expires_in` to trigger refresh before
/// the token actually expires.
const EXPIRY_BUFFER_SECS: u64 = 60;

/// Sovereign cloud the credentials belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cloud {
    /// Global Azure.
    #[default]
    Public,
    /// Azure operated by 21Vianet.
    China,
}

impl Cloud {
    /// Azure AD authority host.
    pub fn authority_host(self) -> &'static str {
        match self {
            Cloud::Public => "login.microsoftonline.com",
            Cloud::China => "login.chinacloudapi.cn",
        }
    }

    /// Base URL of Azure Resource Manager, with trailing slash.
    pub fn management_endpoint(self) -> &'static str {
        match self {
            Cloud::Public => "https://management.azure.com/",
            Cloud::China => "https://management.chinacloudapi.cn/",
        }
    }

    /// OAuth2 scope for ARM tokens.
    pub fn management_scope(self) -> &'static str {
        match self {
            Cloud::Public => "https://management.azure.com/.default",
            Cloud::China => "https://management.chinacloudapi.cn/.default",
        }
    }

    /// Blob endpoint template; `{account}` is replaced with the storage
    /// account name.
    pub fn blob_endpoint_template(self) -> &'static str {
        match self {
            Cloud::Public => "https://{account}.blob.core.windows.net",
            Cloud::China => "https://{account}.blob.core.chinacloudapi.cn",
        }
    }
}

/// Form body sent to the token endpoint.
#[derive(Serialize)]
pub struct TokenRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

/// Subset of the Azure AD token response that we need.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Manages OAuth2 token acquisition and caching.
///
/// Invariants:
/// - `response` is `None` until the first successful `refresh_token()` call
///   and again after `invalidate()`.
/// - `acquired_at` is always `Some` when `response` is `Some`.
pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    scope: String,
    client_id: String,
    client_secret: String,
    response: Option<TokenResponse>,
    acquired_at: Option<Instant>,
}

impl TokenProvider {
    pub fn new(cloud: Cloud, tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        let token_url = TOKEN_URL
            .replace("{authority}", cloud.authority_host())
            .replace("{tenant_id}", tenant_id);
        TokenProvider {
            client: reqwest::Client::new(),
            token_url,
            scope: cloud.management_scope().to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            response: None,
            acquired_at: None,
        }
    }

    /// Points the provider at a custom token endpoint. Used by tests to
    /// exercise the refresh path against a mock server.
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    /// Creates a `TokenProvider` with a pre-set token, bypassing Azure AD.
    /// The token is treated as freshly acquired (expires_in = 3600s).
    pub fn with_token(token: &str) -> Self {
        TokenProvider {
            client: reqwest::Client::new(),
            token_url: String::new(),
            scope: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            response: Some(TokenResponse {
                access_token: token.to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 3600,
            }),
            acquired_at: Some(Instant::now()),
        }
    }

    /// Fetches a new token from Azure AD and caches it.
    ///
    /// The body is read as text before the status check so the AADSTS
    /// message ends up in the error.
    pub async fn refresh_token(&mut self) -> Result<()> {
        let body = TokenRequest {
            client_id: &self.client_id,
            scope: &self.scope,
            client_secret: &self.client_secret,
            grant_type: "client_credentials",
        };

        let response = self
            .client
            .post(&self.token_url)
            .form(&body)
            .send()
            .await
            .map_err(|e| SweepError::Auth {
                message: format!("token endpoint unreachable: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SweepError::Auth {
            message: "failed to read token response".to_string(),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            return Err(SweepError::Auth {
                message: format!("token request failed ({status}): {body}"),
                source: None,
            });
        }

        let resp: TokenResponse = serde_json::from_str(&body).map_err(|e| SweepError::Auth {
            message: "failed to parse token response".to_string(),
            source: Some(Box::new(e)),
        })?;
        self.acquired_at = Some(Instant::now());
        self.response = Some(resp);

        Ok(())
    }

    /// Drops the cached token so the next `token()` call returns `None`.
    pub fn invalidate(&mut self) {
        self.response = None;
        self.acquired_at = None;
    }

    fn is_expired(&self) -> bool {
        match (&self.response, self.acquired_at) {
            (Some(resp), Some(acquired)) => {
                let lifetime = resp.expires_in.saturating_sub(EXPIRY_BUFFER_SECS);
                acquired.elapsed().as_secs() >= lifetime
            }
            _ => false,
        }
    }

    /// Returns the cached access token, or `None` if no token exists
    /// or the token has expired (with a 60-second safety buffer).
    pub fn token(&self) -> Option<&str> {
        if self.is_expired() {
            return None;
        }
        self.response.as_ref().map(|ret| ret.access_token.as_str())
    }
}
