//! Whitelist policy: which resources and subscriptions the sweep must leave
//! alone.
//!
//! The built-in defaults protect the shared appliance image containers and
//! the two long-lived AVE disk images. Operators extend or replace them with a
//! TOML file:
//!
//! ```toml
//! vm_whitelist = ["jump-host"]
//! container_whitelist = ["ddvevhds", "templates", "golden"]
//! excluded_subscriptions = ["Production"]
//! ```
//!
//! Keys missing from the file keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SweepError};

/// Substring marking a resource as intentionally long-running.
const LONGRUN_MARKER: &str = "longrun";
/// Name suffix with the same meaning as [`LONGRUN_MARKER`].
const LONGRUN_SUFFIX: &str = "-lr";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// VM names protected by exact match.
    pub vm_whitelist: Vec<String>,
    /// Containers whose blobs (and the containers themselves) are protected.
    pub container_whitelist: Vec<String>,
    /// VHD blob names protected by exact match.
    pub vhd_whitelist: Vec<String>,
    /// Subscription ids or display names skipped by an all-subscription sweep.
    pub excluded_subscriptions: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            vm_whitelist: Vec::new(),
            container_whitelist: vec!["ddvevhds".to_string(), "templates".to_string()],
            vhd_whitelist: vec![
                "AVE-7.4.1.56-disk1.vhd".to_string(),
                "AVE-7.4.0.242-disk1.vhd".to_string(),
            ],
            excluded_subscriptions: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Reads a policy file. Any I/O or parse failure is a `SweepError::Config`.
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| SweepError::Config {
            path: display.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| SweepError::Config {
            path: display,
            message: e.to_string(),
        })
    }

    /// Returns `true` when the resource must never be reported or deleted.
    ///
    /// `container` is the enclosing container for blobs, or the container's
    /// own name for containers.
    pub fn is_protected(&self, name: &str, container: Option<&str>) -> bool {
        if self.vm_whitelist.iter().any(|w| w == name) {
            return true;
        }
        let lower = name.to_lowercase();
        if lower.contains(LONGRUN_MARKER) || lower.ends_with(LONGRUN_SUFFIX) {
            return true;
        }
        if container.is_some_and(|c| self.container_whitelist.iter().any(|w| w == c)) {
            return true;
        }
        self.vhd_whitelist.iter().any(|w| w == name)
    }

    /// Returns `true` when an all-subscription sweep should skip this
    /// subscription. Matches id or display name exactly.
    pub fn is_excluded_subscription(&self, id: &str, display_name: Option<&str>) -> bool {
        self.excluded_subscriptions
            .iter()
            .any(|e| e == id || Some(e.as_str()) == display_name)
    }
}
