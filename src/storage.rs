//! Blob service client for unmanaged disks (VHD page blobs).
//!
//! ARM does not list individual blobs, so VHD discovery and deletion talk to
//! the storage account's data plane directly. Requests are signed with the
//! account key (Shared Key authorization): an HMAC-SHA256 over a canonical
//! string built from the verb, standard headers, `x-ms-*` headers and the
//! canonicalized resource.
//!
//! Listings come back as XML (`EnumerationResults`) and are paged with
//! `NextMarker`.
//!
//! Reference: <https://learn.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key>

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use crate::client::check_status;
use crate::error::{Result, SweepError};

const STORAGE_VERSION: &str = "2021-08-06";
const STORAGE_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on followed `NextMarker` pages for one listing.
const MAX_PAGES: usize = 1000;

// ── Listing payloads ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    containers: Option<ContainerList>,
    #[serde(default)]
    blobs: Option<BlobList>,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerList {
    #[serde(rename = "Container", default)]
    items: Vec<ContainerItem>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

/// A container as reported by List Containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerItem {
    pub name: String,
    #[serde(default)]
    pub properties: LeaseProperties,
}

/// A blob as reported by List Blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlobItem {
    pub name: String,
    #[serde(default)]
    pub properties: BlobProperties,
}

impl BlobItem {
    /// Disk images are page blobs; a `.vhd` name counts too since some
    /// emulators omit `BlobType`.
    pub fn is_vhd(&self) -> bool {
        let page_blob = self
            .properties
            .blob_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("PageBlob"));
        page_blob || self.name.to_ascii_lowercase().ends_with(".vhd")
    }
}

/// Blob properties the sweep reads: type and lease.
///
/// `BlobType` is `BlockBlob`, `PageBlob` or `AppendBlob`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlobProperties {
    #[serde(default)]
    pub blob_type: Option<String>,
    #[serde(default)]
    pub lease_status: Option<String>,
    #[serde(default)]
    pub lease_state: Option<String>,
}

/// Lease fields of a container.
///
/// `LeaseStatus` is `locked`/`unlocked`; `LeaseState` is `available`,
/// `leased`, `expired`, `breaking` or `broken`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LeaseProperties {
    #[serde(default)]
    pub lease_status: Option<String>,
    #[serde(default)]
    pub lease_state: Option<String>,
}

// ── Shared Key signing ────────────────────────────────────────────────

/// Inputs of the Shared Key string-to-sign that vary per request.
pub struct SignedRequest<'a> {
    pub method: &'a Method,
    pub account: &'a str,
    /// URL path, starting with `/`, exactly as sent.
    pub path: &'a str,
    /// Query parameters as sent.
    pub query: &'a [(&'a str, &'a str)],
    /// `x-ms-*` headers as sent.
    pub ms_headers: &'a [(&'a str, &'a str)],
}

impl SignedRequest<'_> {
    /// Builds the canonical string-to-sign for a body-less request.
    ///
    /// The twelve standard header slots are empty because listing and
    /// delete requests carry no body, and the date travels as `x-ms-date`.
    pub fn string_to_sign(&self) -> String {
        let mut out = String::new();
        out.push_str(self.method.as_str());
        out.push('\n');
        out.push_str(&"\n".repeat(11));

        let mut headers: Vec<(String, &str)> = self
            .ms_headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in headers {
            out.push_str(&name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }

        out.push('/');
        out.push_str(self.account);
        out.push_str(self.path);

        let mut params: Vec<(String, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), *v))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in params {
            out.push('\n');
            out.push_str(&name);
            out.push(':');
            out.push_str(value);
        }
        out
    }

    /// Computes the `Authorization` header value.
    pub fn authorization(&self, account_key: &str) -> Result<String> {
        let key = STANDARD.decode(account_key).map_err(|e| {
            SweepError::Misconfiguration(format!(
                "storage account key for {} is not valid base64: {e}",
                self.account
            ))
        })?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&key)
            .map_err(|e| SweepError::Misconfiguration(format!("invalid HMAC key: {e}")))?;
        mac.update(self.string_to_sign().as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{signature}", self.account))
    }
}

/// RFC 1123 timestamp for `x-ms-date`.
fn ms_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

// ── Client ────────────────────────────────────────────────────────────

/// Blob service client bound to one storage account and its key.
pub struct BlobClient {
    client: Client,
    account: String,
    account_key: String,
    endpoint: String,
}

impl BlobClient {
    /// `endpoint_template` contains `{account}`, e.g.
    /// `https://{account}.blob.core.windows.net`.
    pub fn new(account: &str, account_key: &str, endpoint_template: &str) -> Result<Self> {
        let client = Client::builder().timeout(STORAGE_REQUEST_TIMEOUT).build()?;
        Ok(BlobClient {
            client,
            account: account.to_string(),
            account_key: account_key.to_string(),
            endpoint: endpoint_template
                .replace("{account}", account)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Path prefix contributed by the endpoint itself (non-empty for
    /// path-style endpoints such as emulators and test servers).
    fn endpoint_path(&self) -> &str {
        let without_scheme = self
            .endpoint
            .split_once("://")
            .map_or(self.endpoint.as_str(), |(_, rest)| rest);
        without_scheme
            .find('/')
            .map_or("", |idx| &without_scheme[idx..])
    }

    async fn send(&self, method: Method, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        let date = ms_date();
        let ms_headers = [("x-ms-date", date.as_str()), ("x-ms-version", STORAGE_VERSION)];
        let full_path = format!("{}{}", self.endpoint_path(), path);
        let authorization = SignedRequest {
            method: &method,
            account: &self.account,
            path: &full_path,
            query,
            ms_headers: &ms_headers,
        }
        .authorization(&self.account_key)?;

        let mut req = self
            .client
            .request(method, format!("{}{}", self.endpoint, path))
            .query(query)
            .header("Authorization", authorization);
        for (name, value) in ms_headers {
            req = req.header(name, value);
        }
        check_status(req.send().await?).await
    }

    async fn list(&self, path: &str, base_query: &[(&str, &str)]) -> Result<Vec<EnumerationResults>> {
        let mut pages = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            if pages.len() >= MAX_PAGES {
                return Err(SweepError::TooManyPages {
                    listing: format!("{}{path}", self.account),
                    pages: MAX_PAGES,
                });
            }
            let mut query: Vec<(&str, &str)> = base_query.to_vec();
            if let Some(m) = marker.as_deref() {
                query.push(("marker", m));
            }
            let body = self.send(Method::GET, path, &query).await?.text().await?;
            let page: EnumerationResults = quick_xml::de::from_str(&body)?;
            let next = page.next_marker.clone().filter(|m| !m.is_empty());
            pages.push(page);
            match next {
                Some(m) => marker = Some(m),
                None => return Ok(pages),
            }
        }
    }

    /// Lists every container in the account.
    pub async fn list_containers(&self) -> Result<Vec<ContainerItem>> {
        let pages = self.list("/", &[("comp", "list")]).await?;
        Ok(pages
            .into_iter()
            .flat_map(|p| p.containers.unwrap_or_default().items)
            .collect())
    }

    /// Lists every blob in `container`.
    pub async fn list_blobs(&self, container: &str) -> Result<Vec<BlobItem>> {
        let path = format!("/{container}");
        let pages = self
            .list(&path, &[("restype", "container"), ("comp", "list")])
            .await?;
        Ok(pages
            .into_iter()
            .flat_map(|p| p.blobs.unwrap_or_default().items)
            .collect())
    }

    /// Deletes a blob. Fails with 412 while the blob holds an active lease.
    pub async fn delete_blob(&self, container: &str, blob: &str) -> Result<()> {
        let path = format!("/{container}/{blob}");
        self.send(Method::DELETE, &path, &[]).await?;
        Ok(())
    }

    /// Deletes a container together with any blobs still inside it.
    pub async fn delete_container(&self, container: &str) -> Result<()> {
        let path = format!("/{container}");
        self.send(Method::DELETE, &path, &[("restype", "container")])
            .await?;
        Ok(())
    }
}
