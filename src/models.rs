//! Azure Resource Manager payloads used by the sweep.
//!
//! Only the fields the sweep reads are modelled; serde ignores the rest, so
//! new ARM properties never break deserialization. Field names follow the
//! ARM camelCase contract (`managedBy`, `ipAddress`, `nextLink`, ...).
//!
//! [`ResourceId`] parses the `/subscriptions/{sub}/resourceGroups/{rg}/
//! providers/{namespace}/{type}/{name}` ids ARM uses for cross references
//! (VM → NIC, NIC → public IP, VM → managed disk).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};

pub const RESOURCES_API_VERSION: &str = "2021-04-01";
pub const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
pub const COMPUTE_API_VERSION: &str = "2023-09-01";
pub const DISKS_API_VERSION: &str = "2023-04-02";
pub const NETWORK_API_VERSION: &str = "2023-09-01";
pub const STORAGE_API_VERSION: &str = "2023-01-01";

// ── Reference types ───────────────────────────────────────────────────

/// `{ "id": "..." }` reference to another ARM resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResource {
    pub id: String,
}

/// Parsed form of an ARM resource id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    pub resource_type: String,
    pub name: String,
}

impl ResourceId {
    /// Parses `/subscriptions/{s}/resourceGroups/{rg}/providers/{ns}/{type}/{name}`.
    ///
    /// Segment keywords are matched case-insensitively because ARM is not
    /// consistent about `resourceGroups` vs `resourcegroups`.
    pub fn parse(id: &str) -> Result<Self> {
        let segments: Vec<&str> = id.trim_matches('/').split('/').collect();
        let invalid = || SweepError::InvalidResourceId(id.to_string());
        if segments.len() < 8
            || !segments[0].eq_ignore_ascii_case("subscriptions")
            || !segments[2].eq_ignore_ascii_case("resourcegroups")
            || !segments[4].eq_ignore_ascii_case("providers")
        {
            return Err(invalid());
        }
        let name = segments[segments.len() - 1];
        if name.is_empty() || segments[1].is_empty() || segments[3].is_empty() {
            return Err(invalid());
        }
        Ok(ResourceId {
            subscription_id: segments[1].to_string(),
            resource_group: segments[3].to_string(),
            provider: segments[5].to_string(),
            resource_type: segments[6..segments.len() - 1].join("/"),
            name: name.to_string(),
        })
    }
}

// ── Subscriptions and resource groups ─────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

// ── Compute ───────────────────────────────────────────────────────────

/// A virtual machine, optionally with its instance view expanded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualMachine {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: VirtualMachineProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    #[serde(default)]
    pub hardware_profile: Option<HardwareProfile>,
    #[serde(default)]
    pub storage_profile: StorageProfile,
    #[serde(default)]
    pub network_profile: NetworkProfile,
    #[serde(default)]
    pub instance_view: Option<InstanceView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    #[serde(default)]
    pub vm_size: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default)]
    pub os_disk: Option<OsDisk>,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vhd: Option<VirtualHardDisk>,
    #[serde(default)]
    pub managed_disk: Option<ManagedDiskParameters>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub lun: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "diskSizeGB")]
    pub disk_size_gb: Option<u32>,
    #[serde(default)]
    pub vhd: Option<VirtualHardDisk>,
    #[serde(default)]
    pub managed_disk: Option<ManagedDiskParameters>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualHardDisk {
    pub uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagedDiskParameters {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    #[serde(default)]
    pub network_interfaces: Vec<SubResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceView {
    #[serde(default)]
    pub statuses: Vec<InstanceViewStatus>,
}

/// One entry of a VM instance view.
///
/// ARM reports provisioning first (`ProvisioningState/succeeded`) and the
/// power state second (`PowerState/running`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceViewStatus {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub display_status: Option<String>,
}

/// A managed disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Id of the VM the disk is attached to; absent when unattached.
    #[serde(default)]
    pub managed_by: Option<String>,
}

// ── Network ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: NetworkInterfaceProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceProperties {
    #[serde(default)]
    pub virtual_machine: Option<SubResource>,
    #[serde(default)]
    pub ip_configurations: Vec<IpConfiguration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpConfiguration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: IpConfigurationProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpConfigurationProperties {
    #[serde(default, rename = "privateIPAddress")]
    pub private_ip_address: Option<String>,
    #[serde(default, rename = "publicIPAddress")]
    pub public_ip_address: Option<SubResource>,
}

impl NetworkInterface {
    /// Ids of every public IP bound to any of the NIC's IP configurations.
    pub fn public_ip_ids(&self) -> Vec<String> {
        self.properties
            .ip_configurations
            .iter()
            .filter_map(|c| c.properties.public_ip_address.as_ref())
            .map(|r| r.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicIpAddress {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: PublicIpAddressProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddressProperties {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub ip_configuration: Option<SubResource>,
}

// ── Storage ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageAccount {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageAccountKeys {
    #[serde(default)]
    pub keys: Vec<StorageAccountKey>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountKey {
    pub key_name: String,
    pub value: String,
}
