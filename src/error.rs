//! Typed error hierarchy for the az-sweep crate.
//!
//! `SweepError` covers every failure boundary the sweep touches: the Azure AD
//! token endpoint, the ARM REST API, the Blob service, long-running operation
//! polling, scope resolution and local configuration. Variants keep enough
//! context (status code, response body, resource identity) to print a single
//! descriptive line without losing the cause chain.
//!
//! Which errors are fatal is decided by the caller, not here:
//! - `ScopeNotFound` and `Misconfiguration` stop a sweep before it starts.
//! - Everything else is recovered per resource by the enumerator, the
//!   deletion executor and the orchestrator.

use reqwest::StatusCode;

use crate::resources::ResourceKind;

/// Unified error type for all az-sweep library operations.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// Authentication failure at the Azure AD token endpoint.
    ///
    /// `message` carries the HTTP status and the AADSTS error body when the
    /// endpoint answered at all.
    #[error("authentication failed: {message}")]
    Auth {
        /// Human-readable description including status and AADSTS body.
        message: String,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// ARM or the Blob service returned a non-success HTTP status.
    ///
    /// The body is preserved because ARM error payloads
    /// (`{"error":{"code":...,"message":...}}`) are the only useful
    /// diagnostic for permission and conflict failures.
    #[error("API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by the service.
        status: StatusCode,
        /// The raw response body text.
        body: String,
    },

    /// A long-running operation reached a terminal state other than
    /// `Succeeded`.
    #[error("operation {operation} ended with status {status}")]
    OperationFailed {
        /// The polled operation URL or resource path.
        operation: String,
        /// The terminal status reported by ARM (`Failed`, `Canceled`).
        status: String,
    },

    /// Polling a long-running operation exceeded the configured timeout.
    #[error("operation {operation} timed out after {elapsed:?}")]
    Timeout {
        /// Total time spent waiting.
        elapsed: std::time::Duration,
        /// The polled operation URL or resource path.
        operation: String,
    },

    /// A named subscription or resource group does not exist.
    #[error("{scope} not found")]
    ScopeNotFound {
        /// Description of the missing scope, e.g. `resource group 'rg1'`.
        scope: String,
    },

    /// Missing credentials or other environment needed before any call.
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),

    /// The sweep policy file could not be read or parsed.
    #[error("invalid policy file {path}: {message}")]
    Config {
        /// Path of the offending file.
        path: String,
        /// Reader or TOML parser message.
        message: String,
    },

    /// A bounded linear search ran out of candidates (e.g. every data-disk
    /// LUN of a VM is taken).
    #[error("no available {what} (searched {searched} slots)")]
    NoAvailableSlot {
        /// What was being allocated.
        what: &'static str,
        /// Number of slots inspected.
        searched: u32,
    },

    /// A paged listing kept returning continuation links past the page cap.
    #[error("listing {listing} exceeded {pages} pages")]
    TooManyPages {
        /// The listing path being followed.
        listing: String,
        /// The page cap that was hit.
        pages: usize,
    },

    /// An ARM resource id or blob URI did not have the expected shape.
    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),

    /// JSON deserialization of an ARM response failed.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// XML deserialization of a Blob service listing failed.
    #[error("failed to parse blob listing: {0}")]
    Xml(#[from] quick_xml::de::DeError),

    /// A transport-level failure (DNS, TCP, TLS, request timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl SweepError {
    /// Returns `true` when the service answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SweepError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Failure to delete the primary resource handed to the deletion executor.
///
/// Dependents that fail during a cascade are reported as failed records,
/// not as this error.
#[derive(Debug, thiserror::Error)]
#[error("failed to delete {kind} {name}: {source}")]
pub struct DeletionError {
    /// Kind of the resource that could not be deleted.
    pub kind: ResourceKind,
    /// Name of the resource that could not be deleted.
    pub name: String,
    /// The provider error.
    #[source]
    pub source: SweepError,
}
