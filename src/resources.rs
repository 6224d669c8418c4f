//! Domain model of the sweep: scopes and the resources it classifies.
//!
//! Enumeration converts ARM/Blob payloads into [`ManagedResource`] once, so
//! classification and deletion never look at optional provider fields again.
//! In particular a VM's disks are resolved into [`DiskBacking`] up front.

use serde::Serialize;
use std::fmt;

use crate::error::{Result, SweepError};
use crate::models::{DataDisk, InstanceViewStatus, OsDisk, VirtualMachine};

/// Kinds of resources the sweep reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    VirtualMachine,
    NetworkInterface,
    PublicIpAddress,
    ManagedDisk,
    Blob,
    Container,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::VirtualMachine => "VM",
            ResourceKind::NetworkInterface => "NIC",
            ResourceKind::PublicIpAddress => "Public IP",
            ResourceKind::ManagedDisk => "Disk",
            ResourceKind::Blob => "VHD",
            ResourceKind::Container => "Container",
        };
        f.write_str(label)
    }
}

/// A resource group within a subscription; the unit of iteration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupScope {
    pub subscription_id: String,
    pub resource_group: String,
}

impl GroupScope {
    pub fn new(subscription_id: &str, resource_group: &str) -> Self {
        GroupScope {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
        }
    }
}

impl fmt::Display for GroupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subscription_id, self.resource_group)
    }
}

/// Identity of a storage account, enough to fetch its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StorageAccountRef {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
}

/// How a VM disk is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskBacking {
    /// A page blob in a storage account.
    Unmanaged { uri: String },
    /// A platform-managed disk resource.
    Managed { id: String },
}

/// A disk referenced by a VM storage profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRef {
    pub name: String,
    pub backing: DiskBacking,
}

impl DiskRef {
    fn from_parts(
        name: Option<&str>,
        vhd_uri: Option<&str>,
        managed_id: Option<&str>,
    ) -> Option<Self> {
        let backing = match (vhd_uri, managed_id) {
            (Some(uri), _) => DiskBacking::Unmanaged {
                uri: uri.to_string(),
            },
            (None, Some(id)) => DiskBacking::Managed { id: id.to_string() },
            (None, None) => return None,
        };
        let name = name.map(str::to_owned).unwrap_or_else(|| match &backing {
            DiskBacking::Unmanaged { uri } => uri.rsplit('/').next().unwrap_or(uri).to_string(),
            DiskBacking::Managed { id } => id.rsplit('/').next().unwrap_or(id).to_string(),
        });
        Some(DiskRef { name, backing })
    }

    fn from_os_disk(disk: &OsDisk) -> Option<Self> {
        DiskRef::from_parts(
            disk.name.as_deref(),
            disk.vhd.as_ref().map(|v| v.uri.as_str()),
            disk.managed_disk.as_ref().and_then(|m| m.id.as_deref()),
        )
    }

    fn from_data_disk(disk: &DataDisk) -> Option<Self> {
        DiskRef::from_parts(
            disk.name.as_deref(),
            disk.vhd.as_ref().map(|v| v.uri.as_str()),
            disk.managed_disk.as_ref().and_then(|m| m.id.as_deref()),
        )
    }
}

/// Location of a VHD blob parsed from its URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub account: String,
    pub container: String,
    pub blob: String,
}

impl BlobLocation {
    /// Parses `https://{account}.blob.core.windows.net/{container}/{blob...}`.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || SweepError::InvalidResourceId(uri.to_string());
        let url = reqwest::Url::parse(uri).map_err(|_| invalid())?;
        let account = url
            .host_str()
            .and_then(|h| h.split('.').next())
            .filter(|a| !a.is_empty())
            .ok_or_else(invalid)?;
        let path = url.path().trim_start_matches('/');
        let (container, blob) = path.split_once('/').ok_or_else(invalid)?;
        if container.is_empty() || blob.is_empty() {
            return Err(invalid());
        }
        Ok(BlobLocation {
            account: account.to_string(),
            container: container.to_string(),
            blob: blob.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmResource {
    pub scope: GroupScope,
    pub name: String,
    pub statuses: Vec<InstanceViewStatus>,
    pub nic_ids: Vec<String>,
    pub os_disk: Option<DiskRef>,
    pub data_disks: Vec<DiskRef>,
}

impl VmResource {
    /// Converts a VM fetched with `$expand=instanceView`.
    pub fn from_model(scope: &GroupScope, vm: &VirtualMachine) -> Self {
        let props = &vm.properties;
        VmResource {
            scope: scope.clone(),
            name: vm.name.clone(),
            statuses: props
                .instance_view
                .as_ref()
                .map(|iv| iv.statuses.clone())
                .unwrap_or_default(),
            nic_ids: props
                .network_profile
                .network_interfaces
                .iter()
                .map(|r| r.id.clone())
                .collect(),
            os_disk: props
                .storage_profile
                .os_disk
                .as_ref()
                .and_then(DiskRef::from_os_disk),
            data_disks: props
                .storage_profile
                .data_disks
                .iter()
                .filter_map(DiskRef::from_data_disk)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicResource {
    pub scope: GroupScope,
    pub name: String,
    pub virtual_machine: Option<String>,
    pub public_ip_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIpResource {
    pub scope: GroupScope,
    pub name: String,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskResource {
    pub scope: GroupScope,
    pub name: String,
    pub managed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobResource {
    pub account: StorageAccountRef,
    pub container: String,
    pub name: String,
    pub lease_status: Option<String>,
    pub lease_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerResource {
    pub account: StorageAccountRef,
    pub name: String,
    /// Blobs present when the container was enumerated.
    pub blob_count: usize,
    /// Whether any of those blobs held a lease.
    pub has_leased_blob: bool,
}

/// Every resource kind the sweep can classify and delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedResource {
    VirtualMachine(VmResource),
    NetworkInterface(NicResource),
    PublicIpAddress(PublicIpResource),
    ManagedDisk(DiskResource),
    UnmanagedBlob(BlobResource),
    Container(ContainerResource),
}

impl ManagedResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedResource::VirtualMachine(_) => ResourceKind::VirtualMachine,
            ManagedResource::NetworkInterface(_) => ResourceKind::NetworkInterface,
            ManagedResource::PublicIpAddress(_) => ResourceKind::PublicIpAddress,
            ManagedResource::ManagedDisk(_) => ResourceKind::ManagedDisk,
            ManagedResource::UnmanagedBlob(_) => ResourceKind::Blob,
            ManagedResource::Container(_) => ResourceKind::Container,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ManagedResource::VirtualMachine(r) => &r.name,
            ManagedResource::NetworkInterface(r) => &r.name,
            ManagedResource::PublicIpAddress(r) => &r.name,
            ManagedResource::ManagedDisk(r) => &r.name,
            ManagedResource::UnmanagedBlob(r) => &r.name,
            ManagedResource::Container(r) => &r.name,
        }
    }

    /// Container the resource lives in, for blobs and containers.
    pub fn container(&self) -> Option<&str> {
        match self {
            ManagedResource::UnmanagedBlob(r) => Some(&r.container),
            ManagedResource::Container(r) => Some(&r.name),
            _ => None,
        }
    }

    /// Resource group owning the resource (the storage account's group for
    /// blobs and containers).
    pub fn resource_group(&self) -> &str {
        match self {
            ManagedResource::VirtualMachine(r) => &r.scope.resource_group,
            ManagedResource::NetworkInterface(r) => &r.scope.resource_group,
            ManagedResource::PublicIpAddress(r) => &r.scope.resource_group,
            ManagedResource::ManagedDisk(r) => &r.scope.resource_group,
            ManagedResource::UnmanagedBlob(r) => &r.account.resource_group,
            ManagedResource::Container(r) => &r.account.resource_group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ManagedDiskParameters, VirtualHardDisk};

    #[test]
    fn kind_labels_match_report_wording() {
        assert_eq!(ResourceKind::VirtualMachine.to_string(), "VM");
        assert_eq!(ResourceKind::NetworkInterface.to_string(), "NIC");
        assert_eq!(ResourceKind::PublicIpAddress.to_string(), "Public IP");
        assert_eq!(ResourceKind::Blob.to_string(), "VHD");
    }

    #[test]
    fn vhd_wins_over_managed_disk_when_both_present() {
        let disk = OsDisk {
            name: Some("os".into()),
            vhd: Some(VirtualHardDisk {
                uri: "https://sa.blob.core.windows.net/c/os.vhd".into(),
            }),
            managed_disk: Some(ManagedDiskParameters {
                id: Some("/x/disks/os".into()),
            }),
        };
        let r = DiskRef::from_os_disk(&disk).unwrap();
        assert!(matches!(r.backing, DiskBacking::Unmanaged { .. }));
    }

    #[test]
    fn unnamed_managed_disk_takes_name_from_id() {
        let disk = DataDisk {
            lun: 1,
            managed_disk: Some(ManagedDiskParameters {
                id: Some("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/data1".into()),
            }),
            ..Default::default()
        };
        let r = DiskRef::from_data_disk(&disk).unwrap();
        assert_eq!(r.name, "data1");
        assert!(matches!(r.backing, DiskBacking::Managed { .. }));
    }

    #[test]
    fn disk_without_backing_is_dropped() {
        assert!(DiskRef::from_data_disk(&DataDisk::default()).is_none());
    }

    #[test]
    fn blob_location_parses_nested_blob_names() {
        let loc =
            BlobLocation::parse("https://ddvestg.blob.core.windows.net/vm1-vhds/dir/os.vhd").unwrap();
        assert_eq!(loc.account, "ddvestg");
        assert_eq!(loc.container, "vm1-vhds");
        assert_eq!(loc.blob, "dir/os.vhd");
    }

    #[test]
    fn blob_location_rejects_container_only_uri() {
        assert!(BlobLocation::parse("https://sa.blob.core.windows.net/vhds").is_err());
        assert!(BlobLocation::parse("not a uri").is_err());
    }

    #[test]
    fn vm_model_converts_into_resource() {
        let vm: VirtualMachine = serde_json::from_value(serde_json::json!({
            "name": "vm1",
            "properties": {
                "storageProfile": {
                    "osDisk": {"name": "vm1-os", "vhd": {"uri": "https://sa1.blob.core.windows.net/vm1-vhds/os.vhd"}},
                    "dataDisks": [{"lun": 0, "name": "d0", "managedDisk": {"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/d0"}}]
                },
                "networkProfile": {"networkInterfaces": [{"id": "nic-id"}]},
                "instanceView": {"statuses": [{"code": "PowerState/stopped"}]}
            }
        }))
        .unwrap();
        let r = VmResource::from_model(&GroupScope::new("s", "rg"), &vm);
        assert_eq!(r.nic_ids, vec!["nic-id".to_string()]);
        assert_eq!(r.os_disk.as_ref().unwrap().name, "vm1-os");
        assert_eq!(r.data_disks.len(), 1);
        assert_eq!(r.statuses.len(), 1);
    }
}
