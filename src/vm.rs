//! Operator-facing VM operations.
//!
//! Power actions are POSTs that ARM tracks as long-running operations; every
//! function here returns once the operation is terminal.
//!
//! | Function | ARM call |
//! |----------|----------|
//! | [`start`] | POST `.../virtualMachines/{vm}/start` |
//! | [`power_off`] | POST `.../powerOff` |
//! | [`deallocate`] | POST `.../deallocate` |
//! | [`restart`] | POST `.../restart` |
//! | [`resize`] | PATCH `hardwareProfile.vmSize` |
//! | [`power_state`] | GET with `$expand=instanceView` |
//! | [`list_data_disks`] | GET |
//! | [`attach_data_disk`] / [`detach_data_disk`] | GET, edit `dataDisks`, PUT |
//!
//! Attach and detach round-trip the VM document as raw JSON so fields this
//! crate does not model survive the PUT.

use serde_json::{Value, json};

use crate::classify::power_state as current_power_state;
use crate::client::ArmClient;
use crate::error::{Result, SweepError};
use crate::models::{COMPUTE_API_VERSION, DataDisk, VirtualMachine};
use crate::resources::GroupScope;

/// Number of data-disk LUNs searched for a free slot.
pub const MAX_LUNS: u32 = 64;

/// Azure's size limit for an unmanaged data disk, in GiB.
const MAX_DISK_SIZE_GB: u32 = 1023;

/// Container new unmanaged data disks are placed in.
const DATA_DISK_CONTAINER: &str = "vhds";

/// Data disks whose name contains this hold appliance NVRAM and are hidden
/// from listings.
const NVRAM_MARKER: &str = "nvram";

fn vm_path(scope: &GroupScope, name: &str, suffix: &str) -> String {
    format!(
        "subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{name}{suffix}?api-version={COMPUTE_API_VERSION}",
        scope.subscription_id, scope.resource_group
    )
}

async fn power_action(client: &ArmClient, scope: &GroupScope, name: &str, action: &str) -> Result<()> {
    tracing::info!(event = "vm.action.started", vm = name, action);
    client
        .post_action(&vm_path(scope, name, &format!("/{action}")))
        .await?;
    tracing::info!(event = "vm.action.completed", vm = name, action);
    Ok(())
}

pub async fn start(client: &ArmClient, scope: &GroupScope, name: &str) -> Result<()> {
    power_action(client, scope, name, "start").await
}

/// Stops the guest but keeps compute allocated (and billed).
pub async fn power_off(client: &ArmClient, scope: &GroupScope, name: &str) -> Result<()> {
    power_action(client, scope, name, "powerOff").await
}

/// Stops the VM and releases its compute allocation.
pub async fn deallocate(client: &ArmClient, scope: &GroupScope, name: &str) -> Result<()> {
    power_action(client, scope, name, "deallocate").await
}

pub async fn restart(client: &ArmClient, scope: &GroupScope, name: &str) -> Result<()> {
    power_action(client, scope, name, "restart").await
}

/// Changes the VM size. ARM restarts the VM if it is running.
pub async fn resize(client: &ArmClient, scope: &GroupScope, name: &str, vm_size: &str) -> Result<()> {
    let body = json!({ "properties": { "hardwareProfile": { "vmSize": vm_size } } });
    client.patch(&vm_path(scope, name, ""), &body).await?;
    tracing::info!(event = "vm.resize.completed", vm = name, vm_size);
    Ok(())
}

/// Display status of the VM's power state, e.g. `VM running`.
pub async fn power_state(
    client: &ArmClient,
    scope: &GroupScope,
    name: &str,
) -> Result<Option<String>> {
    let path = format!(
        "subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{name}?$expand=instanceView&api-version={COMPUTE_API_VERSION}",
        scope.subscription_id, scope.resource_group
    );
    let vm: VirtualMachine = client.get(&path).await?;
    let statuses = vm
        .properties
        .instance_view
        .map(|iv| iv.statuses)
        .unwrap_or_default();
    Ok(current_power_state(&statuses)
        .and_then(|s| s.display_status.clone().or_else(|| s.code.clone())))
}

/// Data disks of the VM, excluding NVRAM disks.
pub async fn list_data_disks(
    client: &ArmClient,
    scope: &GroupScope,
    name: &str,
) -> Result<Vec<DataDisk>> {
    let vm: VirtualMachine = client.get(&vm_path(scope, name, "")).await?;
    Ok(vm
        .properties
        .storage_profile
        .data_disks
        .into_iter()
        .filter(|d| {
            !d.name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(NVRAM_MARKER))
        })
        .collect())
}

/// Returns the lowest LUN in `0..MAX_LUNS` not present in `used`.
pub fn next_free_lun(used: &[u32]) -> Result<u32> {
    (0..MAX_LUNS)
        .find(|lun| !used.contains(lun))
        .ok_or(SweepError::NoAvailableSlot {
            what: "data disk LUN",
            searched: MAX_LUNS,
        })
}

/// Parameters for attaching an unmanaged data disk.
#[derive(Debug, Clone)]
pub struct AttachDisk {
    pub disk_name: String,
    /// Requested size; clamped to `1..=1023` GiB.
    pub size_gb: u32,
    pub storage_account: String,
    /// Attach an existing VHD instead of creating an empty one.
    pub existing: bool,
}

fn data_disks_mut<'a>(vm: &'a mut Value, name: &str) -> Result<&'a mut Vec<Value>> {
    let profile = vm
        .pointer_mut("/properties/storageProfile")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| SweepError::InvalidResourceId(format!("VM {name} has no storage profile")))?;
    let disks = profile
        .entry("dataDisks")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !disks.is_array() {
        *disks = Value::Array(Vec::new());
    }
    disks
        .as_array_mut()
        .ok_or_else(|| SweepError::InvalidResourceId(format!("VM {name} has malformed dataDisks")))
}

/// Attaches an unmanaged data disk at the first free LUN and returns it.
///
/// The VHD lives at `{blob endpoint}/vhds/{disk_name}.vhd` in
/// `storage_account`.
pub async fn attach_data_disk(
    client: &ArmClient,
    scope: &GroupScope,
    name: &str,
    disk: &AttachDisk,
    blob_endpoint_template: &str,
) -> Result<u32> {
    let path = vm_path(scope, name, "");
    let mut vm: Value = client.get(&path).await?;
    let disks = data_disks_mut(&mut vm, name)?;
    let used: Vec<u32> = disks
        .iter()
        .filter_map(|d| d.get("lun").and_then(Value::as_u64))
        .filter_map(|lun| u32::try_from(lun).ok())
        .collect();
    let lun = next_free_lun(&used)?;
    let uri = format!(
        "{}/{DATA_DISK_CONTAINER}/{}.vhd",
        blob_endpoint_template.replace("{account}", &disk.storage_account),
        disk.disk_name
    );
    disks.push(json!({
        "lun": lun,
        "name": disk.disk_name,
        "diskSizeGB": disk.size_gb.clamp(1, MAX_DISK_SIZE_GB),
        "vhd": { "uri": uri },
        "createOption": if disk.existing { "Attach" } else { "Empty" },
    }));
    client.put(&path, &vm).await?;
    tracing::info!(event = "vm.disk.attached", vm = name, disk = %disk.disk_name, lun);
    Ok(lun)
}

/// Detaches the data disk named `disk_name`. The VHD itself is kept.
pub async fn detach_data_disk(
    client: &ArmClient,
    scope: &GroupScope,
    name: &str,
    disk_name: &str,
) -> Result<()> {
    let path = vm_path(scope, name, "");
    let mut vm: Value = client.get(&path).await?;
    let disks = data_disks_mut(&mut vm, name)?;
    let before = disks.len();
    disks.retain(|d| d.get("name").and_then(Value::as_str) != Some(disk_name));
    if disks.len() == before {
        return Err(SweepError::ScopeNotFound {
            scope: format!("data disk '{disk_name}' on VM '{name}'"),
        });
    }
    client.put(&path, &vm).await?;
    tracing::info!(event = "vm.disk.detached", vm = name, disk = disk_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_free_lun_fills_gaps() {
        assert_eq!(next_free_lun(&[]).unwrap(), 0);
        assert_eq!(next_free_lun(&[0, 1, 3]).unwrap(), 2);
        assert_eq!(next_free_lun(&[1, 2]).unwrap(), 0);
    }

    #[test]
    fn full_lun_range_is_no_available_slot() {
        let used: Vec<u32> = (0..MAX_LUNS).collect();
        match next_free_lun(&used).unwrap_err() {
            SweepError::NoAvailableSlot { searched, .. } => assert_eq!(searched, MAX_LUNS),
            other => panic!("expected NoAvailableSlot, got {other:?}"),
        }
    }

    #[test]
    fn vm_path_appends_action_before_version() {
        let scope = GroupScope::new("s", "rg");
        assert_eq!(
            vm_path(&scope, "vm1", "/powerOff"),
            format!(
                "subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1/powerOff?api-version={COMPUTE_API_VERSION}"
            )
        );
    }

    #[test]
    fn data_disks_are_created_when_missing() {
        let mut vm = json!({ "properties": { "storageProfile": { "osDisk": {} } } });
        data_disks_mut(&mut vm, "vm1").unwrap().push(json!({ "lun": 0 }));
        assert_eq!(vm["properties"]["storageProfile"]["dataDisks"][0]["lun"], 0);
    }

    #[test]
    fn vm_without_storage_profile_is_rejected() {
        let mut vm = json!({ "properties": {} });
        assert!(data_disks_mut(&mut vm, "vm1").is_err());
    }
}
