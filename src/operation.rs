//! Long-running operation tracking for Azure Resource Manager.
//!
//! Every mutating ARM call used by the sweep (DELETE of a VM, NIC, disk or
//! public IP; POST power actions; PUT/PATCH of a VM) follows the same pattern:
//!
//! 1. The call returns `200`/`204` when it completed synchronously, or
//!    `201`/`202` with a tracking header when it did not.
//! 2. `Azure-AsyncOperation` points at a status resource whose `status`
//!    field moves `InProgress → Succeeded | Failed | Canceled`.
//! 3. `Location` points at a URL that answers `202` until the operation is
//!    done and `200`/`204` afterwards.
//!
//! [`wait_for_completion`] blocks the caller until the operation is terminal,
//! which is the "wait on the provider's async operation inline" contract of
//! the sweep.

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::client::ArmClient;
use crate::error::{Result, SweepError};

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";

/// Status of an ARM asynchronous operation.
///
/// `Unknown` absorbs any status string ARM may add later and is treated as
/// non-terminal while polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

/// Body of an `Azure-AsyncOperation` status resource.
#[derive(Debug, Deserialize)]
pub struct AsyncOperation {
    pub status: OperationStatus,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Controls how long-running operations are polled.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before each poll request.
    pub interval: Duration,
    /// Upper bound on total polling time, measured from the first poll.
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        PollConfig { interval, timeout }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        // VM deletion of an unmanaged-disk VM regularly takes several minutes.
        PollConfig {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(900),
        }
    }
}

/// How an accepted request tells us where to look for its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tracker {
    /// Nothing to poll; the response was final.
    Completed,
    /// Poll the status resource at this URL.
    AsyncOperation(String),
    /// Poll this URL until it stops answering `202`.
    Location(String),
}

impl Tracker {
    /// Derives the tracker from the initial response status and headers.
    ///
    /// `Azure-AsyncOperation` wins over `Location` when both are present.
    pub fn from_response(status: StatusCode, headers: &HeaderMap) -> Self {
        if status != StatusCode::CREATED && status != StatusCode::ACCEPTED {
            return Tracker::Completed;
        }
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        if let Some(url) = header(ASYNC_OPERATION_HEADER) {
            Tracker::AsyncOperation(url)
        } else if let Some(url) = header(LOCATION_HEADER) {
            Tracker::Location(url)
        } else {
            Tracker::Completed
        }
    }
}

/// Waits until the operation behind `tracker` reaches a terminal state.
///
/// # Errors
///
/// - `SweepError::OperationFailed` — the status resource reported `Failed`
///   or `Canceled`.
/// - `SweepError::Timeout` — `config.timeout` elapsed first.
/// - Any transport, auth or API error raised by a poll request.
pub async fn wait_for_completion(
    client: &ArmClient,
    tracker: Tracker,
    config: &PollConfig,
) -> Result<()> {
    let started = Instant::now();
    match tracker {
        Tracker::Completed => Ok(()),
        Tracker::AsyncOperation(url) => loop {
            tokio::time::sleep(config.interval).await;
            check_deadline(started, config, &url)?;

            let operation: AsyncOperation = client.get(&url).await?;
            match operation.status {
                OperationStatus::Succeeded => return Ok(()),
                OperationStatus::Failed | OperationStatus::Canceled => {
                    tracing::debug!(
                        event = "arm.operation.failed",
                        operation = %url,
                        error = ?operation.error,
                    );
                    return Err(SweepError::OperationFailed {
                        operation: url,
                        status: format!("{:?}", operation.status),
                    });
                }
                OperationStatus::InProgress | OperationStatus::Unknown => continue,
            }
        },
        Tracker::Location(url) => loop {
            tokio::time::sleep(config.interval).await;
            check_deadline(started, config, &url)?;

            let response = client.send::<()>(Method::GET, &url, None).await?;
            if response.status() != StatusCode::ACCEPTED {
                return Ok(());
            }
        },
    }
}

fn check_deadline(started: Instant, config: &PollConfig, operation: &str) -> Result<()> {
    if started.elapsed() > config.timeout {
        return Err(SweepError::Timeout {
            elapsed: started.elapsed(),
            operation: operation.to_string(),
        });
    }
    Ok(())
}
