//! Attachment/usage classification.
//!
//! Pure functions over [`ManagedResource`]: no provider calls, no side
//! effects. The sweep classifies every resource of a kind before deleting any
//! of them.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::InstanceViewStatus;
use crate::resources::{BlobResource, ContainerResource, ManagedResource, VmResource};

/// Containers created by a provisioning defect: two 16-character segments
/// and a role suffix (`c0`, `d0`, `m0`).
static WRONG_USAGE_CONTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-z]{16}-[0-9a-z]{16}-[cdm]0$").expect("wrong-usage pattern is valid")
});

/// Boot diagnostics containers are recreated by the platform per VM and only
/// matter while the VM still writes to them.
const BOOT_DIAGNOSTICS_PREFIX: &str = "bootdiagnostics-";

const RUNNING_CODE: &str = "PowerState/running";
const PROVISIONING_CODE_PREFIX: &str = "ProvisioningState/";
const PROVISIONING_SUCCEEDED: &str = "Provisioning succeeded";

/// Outcome of classifying one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage {
    pub in_use: bool,
    /// Short human-readable reason, logged at debug level.
    pub reason: String,
}

impl Usage {
    fn in_use(reason: impl Into<String>) -> Self {
        Usage {
            in_use: true,
            reason: reason.into(),
        }
    }

    fn unused(reason: impl Into<String>) -> Self {
        Usage {
            in_use: false,
            reason: reason.into(),
        }
    }
}

pub fn classify(resource: &ManagedResource) -> Usage {
    match resource {
        ManagedResource::VirtualMachine(vm) => classify_vm(vm),
        ManagedResource::NetworkInterface(nic) => match &nic.virtual_machine {
            Some(vm) => Usage::in_use(format!("bound to {vm}")),
            None => Usage::unused("not bound to a VM"),
        },
        ManagedResource::PublicIpAddress(ip) => match ip.ip_address.as_deref() {
            Some(addr) if !addr.is_empty() => Usage::in_use(format!("allocated {addr}")),
            _ => Usage::unused("no allocated address"),
        },
        ManagedResource::ManagedDisk(disk) => match disk.managed_by.as_deref() {
            Some(owner) if !owner.is_empty() => Usage::in_use(format!("managed by {owner}")),
            _ => Usage::unused("no managedBy reference"),
        },
        ManagedResource::UnmanagedBlob(blob) => classify_blob(blob),
        ManagedResource::Container(container) => classify_container(container),
    }
}

/// Returns the status entry that carries the VM power state.
///
/// ARM reports the provisioning outcome in slot 0 and the power state in
/// slot 1; only once provisioning has finished is slot 1 authoritative.
pub fn power_state(statuses: &[InstanceViewStatus]) -> Option<&InstanceViewStatus> {
    let primary = statuses.first()?;
    let is_provisioning = primary
        .code
        .as_deref()
        .is_some_and(|c| c.starts_with(PROVISIONING_CODE_PREFIX))
        || primary
            .display_status
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case(PROVISIONING_SUCCEEDED));
    if is_provisioning {
        statuses.get(1)
    } else {
        Some(primary)
    }
}

fn classify_vm(vm: &VmResource) -> Usage {
    let Some(status) = power_state(&vm.statuses) else {
        return Usage::unused("no power state reported");
    };
    let running = status
        .code
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(RUNNING_CODE))
        || status
            .display_status
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains("running"));
    let label = status
        .display_status
        .as_deref()
        .or(status.code.as_deref())
        .unwrap_or("unknown");
    if running {
        Usage::in_use(label.to_string())
    } else {
        Usage::unused(label.to_string())
    }
}

fn lease_is_free(status: Option<&str>, state: Option<&str>) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case("unlocked"))
        && state.is_some_and(|s| s.eq_ignore_ascii_case("available"))
}

fn classify_blob(blob: &BlobResource) -> Usage {
    let status = blob.lease_status.as_deref();
    let state = blob.lease_state.as_deref();
    let label = format!("{}/{}", status.unwrap_or("?"), state.unwrap_or("?"));
    if lease_is_free(status, state) {
        Usage::unused(label)
    } else {
        Usage::in_use(label)
    }
}

fn classify_container(container: &ContainerResource) -> Usage {
    if is_boot_diagnostics_container(&container.name) {
        return if container.has_leased_blob {
            Usage::in_use("boot diagnostics still leased")
        } else {
            Usage::unused("boot diagnostics leftovers")
        };
    }
    if container.blob_count > 0 {
        Usage::in_use(format!("{} blobs", container.blob_count))
    } else {
        Usage::unused("empty")
    }
}

pub fn is_boot_diagnostics_container(name: &str) -> bool {
    name.starts_with(BOOT_DIAGNOSTICS_PREFIX)
}

/// Returns `true` when the container name matches the provisioning-defect
/// pattern. Such containers are reported as wrong usage even when empty.
pub fn is_wrong_usage_container(name: &str) -> bool {
    WRONG_USAGE_CONTAINER.is_match(name)
}
