//! Structured sweep results.
//!
//! A sweep produces one [`SweepRecord`] per orphan it found and one per
//! deletion outcome. Records are the contract; the text lines printed by the
//! CLI are derived from them with [`SweepRecord::line`]:
//!
//! ```text
//! Unused VM: vm1
//! Wrong Usage Container: 0123456789abcdef-0123456789abcdef-c0
//! VM vm1 successfully deleted.
//! Failed to delete NIC vm1-nic1: API error 409 Conflict: ...
//! ```

use serde::Serialize;

use crate::error::DeletionError;
use crate::resources::{GroupScope, ManagedResource, ResourceKind};

/// Why a resource was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Finding {
    /// Not in use and not whitelisted.
    Unused,
    /// Container produced by a provisioning defect.
    WrongUsage,
}

/// What happened to the resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Dry run: found, not touched.
    Reported,
    Deleted,
    Failed { message: String },
    /// Dependent left in place because the whitelist covers it.
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub resource_group: String,
    /// Enclosing container for blobs; `None` for everything else.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub finding: Finding,
    pub outcome: Outcome,
    /// Name of the VM or NIC whose deletion removed this resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascaded_from: Option<String>,
}

impl SweepRecord {
    fn new(resource: &ManagedResource, finding: Finding, outcome: Outcome) -> Self {
        let container = match resource {
            ManagedResource::UnmanagedBlob(b) => Some(b.container.clone()),
            _ => None,
        };
        SweepRecord {
            kind: resource.kind(),
            name: resource.name().to_string(),
            resource_group: resource.resource_group().to_string(),
            container,
            finding,
            outcome,
            cascaded_from: None,
        }
    }

    pub fn reported(resource: &ManagedResource, finding: Finding) -> Self {
        SweepRecord::new(resource, finding, Outcome::Reported)
    }

    pub fn deleted(resource: &ManagedResource, finding: Finding) -> Self {
        SweepRecord::new(resource, finding, Outcome::Deleted)
    }

    pub fn failed(error: &DeletionError, resource: &ManagedResource, finding: Finding) -> Self {
        SweepRecord::new(
            resource,
            finding,
            Outcome::Failed {
                message: error.source.to_string(),
            },
        )
    }

    /// Record for a dependent removed while deleting `parent`.
    pub fn cascaded(
        kind: ResourceKind,
        name: &str,
        resource_group: &str,
        container: Option<&str>,
        parent: &str,
        outcome: Outcome,
    ) -> Self {
        SweepRecord {
            kind,
            name: name.to_string(),
            resource_group: resource_group.to_string(),
            container: container.map(str::to_owned),
            finding: Finding::Unused,
            outcome,
            cascaded_from: Some(parent.to_string()),
        }
    }

    /// Name as printed: blobs are qualified with their container.
    fn display_name(&self) -> String {
        match &self.container {
            Some(container) => format!("{container}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The text line for this record.
    pub fn line(&self) -> String {
        let name = self.display_name();
        match &self.outcome {
            Outcome::Reported => match self.finding {
                Finding::Unused => format!("Unused {}: {name}", self.kind),
                Finding::WrongUsage => format!("Wrong Usage {}: {name}", self.kind),
            },
            Outcome::Deleted => format!("{} {name} successfully deleted.", self.kind),
            Outcome::Failed { message } => {
                format!("Failed to delete {} {name}: {message}", self.kind)
            }
            Outcome::Protected => format!("{} {name} kept: protected by policy.", self.kind),
        }
    }
}

/// Results of sweeping one resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub subscription_id: String,
    pub resource_group: String,
    pub records: Vec<SweepRecord>,
    /// Recovered enumeration errors (skipped resources, failed list calls).
    pub errors: Vec<String>,
}

impl GroupReport {
    pub fn new(scope: &GroupScope) -> Self {
        GroupReport {
            subscription_id: scope.subscription_id.clone(),
            resource_group: scope.resource_group.clone(),
            records: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// A resource group whose sweep could not even start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedScope {
    pub subscription_id: String,
    /// `None` when listing the subscription's groups failed.
    pub resource_group: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub groups: Vec<GroupReport>,
    pub failed_groups: Vec<FailedScope>,
}

impl SweepReport {
    pub fn records(&self) -> impl Iterator<Item = &SweepRecord> {
        self.groups.iter().flat_map(|g| g.records.iter())
    }

    /// Every record's text line, followed by one line per recovered error.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.records().map(SweepRecord::line).collect();
        for group in &self.groups {
            for error in &group.errors {
                lines.push(format!(
                    "Error in {}/{}: {error}",
                    group.subscription_id, group.resource_group
                ));
            }
        }
        for failed in &self.failed_groups {
            let scope = match &failed.resource_group {
                Some(rg) => format!("{}/{rg}", failed.subscription_id),
                None => failed.subscription_id.clone(),
            };
            lines.push(format!("Failed to sweep {scope}: {}", failed.message));
        }
        lines
    }

    pub fn deleted_count(&self) -> usize {
        self.records()
            .filter(|r| r.outcome == Outcome::Deleted)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.records()
            .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
            .count()
    }

    pub fn protected_count(&self) -> usize {
        self.records()
            .filter(|r| r.outcome == Outcome::Protected)
            .count()
    }

    pub fn reported_count(&self) -> usize {
        self.records()
            .filter(|r| r.outcome == Outcome::Reported)
            .count()
    }
}
