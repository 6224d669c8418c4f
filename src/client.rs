//! Authenticated HTTP client for Azure Resource Manager.
//!
//! `ArmClient` wraps a `reqwest::Client` and a `TokenProvider` behind a
//! `Mutex`, providing JSON request helpers, `nextLink` pagination, and
//! mutating helpers that block until ARM's long-running operation finishes.
//!
//! Token lifecycle:
//! - Lazy acquisition: the first request that finds no cached token triggers
//!   `refresh_token()` via `bearer_token()`.
//! - Expiry-aware: an expired token is refreshed on the next request.
//! - One-shot 401 retry: a `401 Unauthorized` invalidates the cached token,
//!   refreshes once, and retries the request exactly once.
//!
//! Paths are relative to the management endpoint (no leading slash). Absolute
//! URLs (`nextLink`, `Azure-AsyncOperation`, `Location`) are used as-is.

use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::{Cloud, TokenProvider};
use crate::error::{Result, SweepError};
use crate::operation::{PollConfig, Tracker, wait_for_completion};

/// Connect timeout for ARM calls (TCP + TLS handshake).
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall per-request timeout. Long-running operations are polled, so no
/// single round-trip should come close to this.
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound on followed `nextLink` pages for one list call.
const MAX_PAGES: usize = 1000;

fn build_api_client() -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(API_CONNECT_TIMEOUT)
        .timeout(API_REQUEST_TIMEOUT)
        .build()?)
}

/// One page of an ARM collection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default)]
    pub next_link: Option<String>,
}

/// Authenticated HTTP client for the ARM REST API.
///
/// - `auth` sits behind a `Mutex` because `refresh_token()` needs `&mut self`.
///   The lock is held only for the token check or refresh, never across an
///   API round-trip.
/// - `base_url` is a `String` so tests can point it at a wiremock server.
pub struct ArmClient {
    client: Client,
    base_url: String,
    auth: Mutex<TokenProvider>,
    poll: PollConfig,
}

impl ArmClient {
    pub fn new(cloud: Cloud, auth: TokenProvider) -> Result<Self> {
        Self::with_base_url(auth, cloud.management_endpoint())
    }

    /// Constructor that accepts a custom base URL, used by tests to point
    /// at a local mock server instead of ARM.
    pub fn with_base_url(auth: TokenProvider, base_url: &str) -> Result<Self> {
        Ok(ArmClient {
            client: build_api_client()?,
            base_url: base_url.to_string(),
            auth: Mutex::new(auth),
            poll: PollConfig::default(),
        })
    }

    /// Replaces the long-running operation polling policy.
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut auth = self.auth.lock().await;
        if auth.token().is_none() {
            auth.refresh_token().await?;
        }
        auth.token().map(str::to_owned).ok_or_else(|| SweepError::Auth {
            message: "token missing after refresh".to_string(),
            source: None,
        })
    }

    async fn force_refresh(&self) -> Result<String> {
        let mut auth = self.auth.lock().await;
        auth.invalidate();
        auth.refresh_token().await?;
        auth.token().map(str::to_owned).ok_or_else(|| SweepError::Auth {
            message: "token missing after forced refresh".to_string(),
            source: None,
        })
    }

    fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&B>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url).bearer_auth(token);
        if let Some(payload) = body {
            req = req.json(payload);
        }
        req
    }

    /// Core HTTP method: sends an authenticated request and returns the
    /// response once its status is a success.
    ///
    /// A `401` triggers one forced token refresh and one retry. Any other
    /// non-success status becomes `SweepError::Api` with the body preserved.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let url = self.url(path);

        let token = self.bearer_token().await?;
        let mut resp = self
            .build_request(method.clone(), &url, &token, body)
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(event = "arm.client.token_rejected", url = %url);
            let fresh_token = self.force_refresh().await?;
            resp = self
                .build_request(method, &url, &fresh_token, body)
                .send()
                .await?;
        }

        check_status(resp).await
    }

    /// Sends an authenticated GET request and deserializes the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.send::<()>(Method::GET, path, None).await?;
        Ok(resp.json::<T>().await?)
    }

    /// GETs an ARM collection and follows `nextLink` until exhausted.
    pub async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());
        let mut pages = 0;
        while let Some(link) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(SweepError::TooManyPages {
                    listing: path.to_string(),
                    pages: MAX_PAGES,
                });
            }
            let page: ArmList<T> = self.get(&link).await?;
            items.extend(page.value);
            next = page.next_link.filter(|l| !l.is_empty());
        }
        Ok(items)
    }

    /// Returns `false` when the resource answers 404.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        match self.send::<()>(Method::GET, path, None).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Sends an authenticated POST with a JSON body and deserializes the
    /// response (e.g. `listKeys`).
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self.send(Method::POST, path, Some(body)).await?;
        Ok(resp.json::<T>().await?)
    }

    /// Sends a request and blocks until its long-running operation ends.
    pub async fn send_and_wait<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()> {
        let resp = self.send(method, path, body).await?;
        let tracker = Tracker::from_response(resp.status(), resp.headers());
        wait_for_completion(self, tracker, &self.poll).await
    }

    /// DELETE and wait for completion.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send_and_wait::<()>(Method::DELETE, path, None).await
    }

    /// Body-less POST action (start, powerOff, ...) and wait for completion.
    pub async fn post_action(&self, path: &str) -> Result<()> {
        self.send_and_wait::<()>(Method::POST, path, None).await
    }

    /// PUT and wait for completion.
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send_and_wait(Method::PUT, path, Some(body)).await
    }

    /// PATCH and wait for completion.
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send_and_wait(Method::PATCH, path, Some(body)).await
    }
}

/// Turns a non-success response into `SweepError::Api`, keeping the body.
pub(crate) async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SweepError::Api { status, body })
}
