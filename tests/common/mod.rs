//! In-memory `CloudProvider` used by the sweep integration tests.
//!
//! Deletions are applied to the in-memory state and appended to an ordered
//! log (`"vm:vm1"`, `"blob:vm1-vhds/os.vhd"`, ...), so tests can assert both
//! what was deleted and in which order. Deleting a VM releases what the real
//! platform releases: NIC back-references, disk `managedBy` and VHD leases.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use az_sweep::error::{Result, SweepError};
use az_sweep::models::{
    Disk, InstanceView, InstanceViewStatus, IpConfiguration, IpConfigurationProperties,
    NetworkInterface, NetworkInterfaceProperties, NetworkProfile, OsDisk, PublicIpAddress,
    PublicIpAddressProperties, ResourceGroup, StorageProfile, SubResource, Subscription,
    VirtualHardDisk, VirtualMachine, VirtualMachineProperties,
};
use az_sweep::provider::CloudProvider;
use az_sweep::resources::{BlobLocation, GroupScope, StorageAccountRef};
use az_sweep::storage::{BlobItem, BlobProperties, ContainerItem, LeaseProperties};

pub const SUB: &str = "sub-1";

pub fn arm_id(scope: &GroupScope, provider_type: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{provider_type}/{name}",
        scope.subscription_id, scope.resource_group
    )
}

pub fn vm_id(scope: &GroupScope, name: &str) -> String {
    arm_id(scope, "Microsoft.Compute/virtualMachines", name)
}

pub fn nic_id(scope: &GroupScope, name: &str) -> String {
    arm_id(scope, "Microsoft.Network/networkInterfaces", name)
}

pub fn pip_id(scope: &GroupScope, name: &str) -> String {
    arm_id(scope, "Microsoft.Network/publicIPAddresses", name)
}

pub fn vhd_uri(account: &str, container: &str, blob: &str) -> String {
    format!("https://{account}.blob.core.windows.net/{container}/{blob}")
}

fn not_found(what: &str) -> SweepError {
    SweepError::Api {
        status: StatusCode::NOT_FOUND,
        body: format!("{what} not found"),
    }
}

fn statuses(running: bool) -> Vec<InstanceViewStatus> {
    let power = if running { "running" } else { "stopped" };
    vec![
        InstanceViewStatus {
            code: Some("ProvisioningState/succeeded".into()),
            display_status: Some("Provisioning succeeded".into()),
        },
        InstanceViewStatus {
            code: Some(format!("PowerState/{power}")),
            display_status: Some(format!("VM {power}")),
        },
    ]
}

fn blob_properties(blob_type: &str, leased: bool) -> BlobProperties {
    let (status, state) = if leased {
        ("locked", "leased")
    } else {
        ("unlocked", "available")
    };
    BlobProperties {
        blob_type: Some(blob_type.into()),
        lease_status: Some(status.into()),
        lease_state: Some(state.into()),
    }
}

#[derive(Default)]
pub struct State {
    pub subscriptions: Vec<Subscription>,
    pub groups: Vec<GroupScope>,
    pub vms: Vec<(GroupScope, VirtualMachine)>,
    pub nics: Vec<(GroupScope, NetworkInterface)>,
    pub public_ips: Vec<(GroupScope, PublicIpAddress)>,
    pub disks: Vec<(GroupScope, Disk)>,
    pub accounts: Vec<StorageAccountRef>,
    /// `(account, container)` → blobs, ordered like a real listing.
    pub containers: BTreeMap<(String, String), Vec<BlobItem>>,
    /// Ordered log of successful deletions.
    pub deletes: Vec<String>,
    /// Resource names whose deletion fails with 409.
    pub failing_deletes: HashSet<String>,
    /// Resource groups whose VM listing fails with 500.
    pub failing_groups: HashSet<String>,
}

#[derive(Default)]
pub struct FakeCloud {
    pub state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Self {
        let fake = FakeCloud::default();
        fake.add_subscription(SUB, "Dev");
        fake
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn deletes(&self) -> Vec<String> {
        self.with(|s| s.deletes.clone())
    }

    pub fn add_subscription(&self, id: &str, display_name: &str) {
        self.with(|s| {
            s.subscriptions.push(Subscription {
                subscription_id: id.into(),
                display_name: Some(display_name.into()),
                state: Some("Enabled".into()),
            })
        });
    }

    pub fn add_group(&self, subscription: &str, rg: &str) -> GroupScope {
        let scope = GroupScope::new(subscription, rg);
        self.with(|s| s.groups.push(scope.clone()));
        scope
    }

    /// Adds a VM, optionally with an unmanaged OS disk whose blob is leased
    /// while the VM exists.
    pub fn add_vm(&self, scope: &GroupScope, name: &str, running: bool, nics: &[&str], os_vhd: Option<&str>) {
        let vm = VirtualMachine {
            id: vm_id(scope, name),
            name: name.into(),
            properties: VirtualMachineProperties {
                storage_profile: StorageProfile {
                    os_disk: os_vhd.map(|uri| OsDisk {
                        name: Some(format!("{name}-os")),
                        vhd: Some(VirtualHardDisk { uri: uri.into() }),
                        managed_disk: None,
                    }),
                    data_disks: Vec::new(),
                },
                network_profile: NetworkProfile {
                    network_interfaces: nics
                        .iter()
                        .map(|n| SubResource {
                            id: nic_id(scope, n),
                        })
                        .collect(),
                },
                instance_view: Some(InstanceView {
                    statuses: statuses(running),
                }),
                ..Default::default()
            },
        };
        self.with(|s| s.vms.push((scope.clone(), vm)));
    }

    pub fn add_nic(&self, scope: &GroupScope, name: &str, vm: Option<&str>, pips: &[&str]) {
        let nic = NetworkInterface {
            id: nic_id(scope, name),
            name: name.into(),
            properties: NetworkInterfaceProperties {
                virtual_machine: vm.map(|v| SubResource { id: vm_id(scope, v) }),
                ip_configurations: vec![IpConfiguration {
                    name: Some("ipconfig1".into()),
                    properties: IpConfigurationProperties {
                        private_ip_address: Some("10.0.0.4".into()),
                        public_ip_address: pips.first().map(|p| SubResource {
                            id: pip_id(scope, p),
                        }),
                    },
                }],
            },
        };
        self.with(|s| s.nics.push((scope.clone(), nic)));
    }

    pub fn add_public_ip(&self, scope: &GroupScope, name: &str, address: Option<&str>) {
        let ip = PublicIpAddress {
            id: pip_id(scope, name),
            name: name.into(),
            properties: PublicIpAddressProperties {
                ip_address: address.map(str::to_owned),
                ip_configuration: None,
            },
        };
        self.with(|s| s.public_ips.push((scope.clone(), ip)));
    }

    pub fn add_disk(&self, scope: &GroupScope, name: &str, managed_by_vm: Option<&str>) {
        let disk = Disk {
            id: arm_id(scope, "Microsoft.Compute/disks", name),
            name: name.into(),
            managed_by: managed_by_vm.map(|v| vm_id(scope, v)),
        };
        self.with(|s| s.disks.push((scope.clone(), disk)));
    }

    pub fn add_account(&self, scope: &GroupScope, name: &str) -> StorageAccountRef {
        let account = StorageAccountRef {
            subscription_id: scope.subscription_id.clone(),
            resource_group: scope.resource_group.clone(),
            name: name.into(),
        };
        self.with(|s| s.accounts.push(account.clone()));
        account
    }

    pub fn add_container(&self, account: &StorageAccountRef, container: &str) {
        self.with(|s| {
            s.containers
                .entry((account.name.clone(), container.into()))
                .or_default();
        });
    }

    /// Adds a page blob, the way disk images are stored.
    pub fn add_blob(&self, account: &StorageAccountRef, container: &str, blob: &str, leased: bool) {
        self.push_blob(account, container, blob, blob_properties("PageBlob", leased));
    }

    /// Adds an unleased block blob (backups, logs and other non-disk data).
    pub fn add_block_blob(&self, account: &StorageAccountRef, container: &str, blob: &str) {
        self.push_blob(account, container, blob, blob_properties("BlockBlob", false));
    }

    fn push_blob(&self, account: &StorageAccountRef, container: &str, blob: &str, properties: BlobProperties) {
        self.with(|s| {
            s.containers
                .entry((account.name.clone(), container.into()))
                .or_default()
                .push(BlobItem {
                    name: blob.into(),
                    properties,
                })
        });
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.with(|s| s.failing_deletes.insert(name.into()));
    }

    pub fn fail_listing_in(&self, rg: &str) {
        self.with(|s| s.failing_groups.insert(rg.into()));
    }

    fn record_delete(&self, kind: &str, name: &str, apply: impl FnOnce(&mut State) -> bool) -> Result<()> {
        self.with(|s| {
            if s.failing_deletes.contains(name) {
                return Err(SweepError::Api {
                    status: StatusCode::CONFLICT,
                    body: format!("{name} is busy"),
                });
            }
            if !apply(s) {
                return Err(not_found(name));
            }
            s.deletes.push(format!("{kind}:{name}"));
            Ok(())
        })
    }
}

fn remove_named<T>(items: &mut Vec<(GroupScope, T)>, scope: &GroupScope, name: &str, get: impl Fn(&T) -> &str) -> Option<T> {
    let idx = items
        .iter()
        .position(|(s, item)| s == scope && get(item) == name)?;
    Some(items.remove(idx).1)
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.with(|s| s.subscriptions.clone()))
    }

    async fn subscription_exists(&self, subscription_id: &str) -> Result<bool> {
        Ok(self.with(|s| {
            s.subscriptions
                .iter()
                .any(|sub| sub.subscription_id == subscription_id)
        }))
    }

    async fn list_resource_groups(&self, subscription_id: &str) -> Result<Vec<ResourceGroup>> {
        Ok(self.with(|s| {
            s.groups
                .iter()
                .filter(|g| g.subscription_id == subscription_id)
                .map(|g| ResourceGroup {
                    name: g.resource_group.clone(),
                    location: Some("westus".into()),
                })
                .collect()
        }))
    }

    async fn resource_group_exists(&self, subscription_id: &str, resource_group: &str) -> Result<bool> {
        Ok(self.with(|s| {
            s.groups
                .iter()
                .any(|g| g.subscription_id == subscription_id && g.resource_group == resource_group)
        }))
    }

    async fn list_virtual_machines(&self, scope: &GroupScope) -> Result<Vec<VirtualMachine>> {
        self.with(|s| {
            if s.failing_groups.contains(&scope.resource_group) {
                return Err(SweepError::Api {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "compute unavailable".into(),
                });
            }
            Ok(s.vms
                .iter()
                .filter(|(g, _)| g == scope)
                .map(|(_, vm)| vm.clone())
                .collect())
        })
    }

    async fn get_virtual_machine(&self, scope: &GroupScope, name: &str) -> Result<VirtualMachine> {
        self.with(|s| {
            s.vms
                .iter()
                .find(|(g, vm)| g == scope && vm.name == name)
                .map(|(_, vm)| vm.clone())
                .ok_or_else(|| not_found(name))
        })
    }

    async fn list_network_interfaces(&self, scope: &GroupScope) -> Result<Vec<NetworkInterface>> {
        Ok(self.with(|s| {
            s.nics
                .iter()
                .filter(|(g, _)| g == scope)
                .map(|(_, n)| n.clone())
                .collect()
        }))
    }

    async fn get_network_interface(&self, scope: &GroupScope, name: &str) -> Result<NetworkInterface> {
        self.with(|s| {
            s.nics
                .iter()
                .find(|(g, n)| g == scope && n.name == name)
                .map(|(_, n)| n.clone())
                .ok_or_else(|| not_found(name))
        })
    }

    async fn list_public_ips(&self, scope: &GroupScope) -> Result<Vec<PublicIpAddress>> {
        Ok(self.with(|s| {
            s.public_ips
                .iter()
                .filter(|(g, _)| g == scope)
                .map(|(_, p)| p.clone())
                .collect()
        }))
    }

    async fn list_disks(&self, scope: &GroupScope) -> Result<Vec<Disk>> {
        Ok(self.with(|s| {
            s.disks
                .iter()
                .filter(|(g, _)| g == scope)
                .map(|(_, d)| d.clone())
                .collect()
        }))
    }

    async fn list_storage_accounts(&self, scope: &GroupScope) -> Result<Vec<StorageAccountRef>> {
        Ok(self.with(|s| {
            s.accounts
                .iter()
                .filter(|a| {
                    a.subscription_id == scope.subscription_id
                        && a.resource_group == scope.resource_group
                })
                .cloned()
                .collect()
        }))
    }

    async fn find_storage_account(&self, subscription_id: &str, name: &str) -> Result<Option<StorageAccountRef>> {
        Ok(self.with(|s| {
            s.accounts
                .iter()
                .find(|a| a.subscription_id == subscription_id && a.name == name)
                .cloned()
        }))
    }

    async fn list_containers(&self, account: &StorageAccountRef) -> Result<Vec<ContainerItem>> {
        Ok(self.with(|s| {
            s.containers
                .keys()
                .filter(|(a, _)| *a == account.name)
                .map(|(_, c)| ContainerItem {
                    name: c.clone(),
                    properties: LeaseProperties {
                        lease_status: Some("unlocked".into()),
                        lease_state: Some("available".into()),
                    },
                })
                .collect()
        }))
    }

    async fn list_blobs(&self, account: &StorageAccountRef, container: &str) -> Result<Vec<BlobItem>> {
        self.with(|s| {
            s.containers
                .get(&(account.name.clone(), container.to_string()))
                .cloned()
                .ok_or_else(|| not_found(container))
        })
    }

    async fn delete_virtual_machine(&self, scope: &GroupScope, name: &str) -> Result<()> {
        self.record_delete("vm", name, |s| {
            let Some(vm) = remove_named(&mut s.vms, scope, name, |v| v.name.as_str()) else {
                return false;
            };
            let id = vm.id.to_lowercase();
            for (_, nic) in s.nics.iter_mut() {
                if nic
                    .properties
                    .virtual_machine
                    .as_ref()
                    .is_some_and(|r| r.id.to_lowercase() == id)
                {
                    nic.properties.virtual_machine = None;
                }
            }
            for (_, disk) in s.disks.iter_mut() {
                if disk.managed_by.as_ref().is_some_and(|m| m.to_lowercase() == id) {
                    disk.managed_by = None;
                }
            }
            let profile = &vm.properties.storage_profile;
            let uris = profile
                .os_disk
                .iter()
                .filter_map(|d| d.vhd.as_ref())
                .chain(profile.data_disks.iter().filter_map(|d| d.vhd.as_ref()))
                .map(|v| v.uri.clone());
            for uri in uris {
                if let Ok(loc) = BlobLocation::parse(&uri) {
                    if let Some(blobs) = s.containers.get_mut(&(loc.account, loc.container)) {
                        for blob in blobs.iter_mut().filter(|b| b.name == loc.blob) {
                            blob.properties.lease_status = Some("unlocked".into());
                            blob.properties.lease_state = Some("available".into());
                        }
                    }
                }
            }
            true
        })
    }

    async fn delete_network_interface(&self, scope: &GroupScope, name: &str) -> Result<()> {
        self.record_delete("nic", name, |s| {
            remove_named(&mut s.nics, scope, name, |n| n.name.as_str()).is_some()
        })
    }

    async fn delete_public_ip(&self, scope: &GroupScope, name: &str) -> Result<()> {
        self.record_delete("pip", name, |s| {
            remove_named(&mut s.public_ips, scope, name, |p| p.name.as_str()).is_some()
        })
    }

    async fn delete_disk(&self, scope: &GroupScope, name: &str) -> Result<()> {
        self.record_delete("disk", name, |s| {
            remove_named(&mut s.disks, scope, name, |d| d.name.as_str()).is_some()
        })
    }

    async fn delete_blob(&self, account: &StorageAccountRef, container: &str, blob: &str) -> Result<()> {
        let key = (account.name.clone(), container.to_string());
        self.record_delete("blob", &format!("{container}/{blob}"), |s| {
            let Some(blobs) = s.containers.get_mut(&key) else {
                return false;
            };
            let before = blobs.len();
            blobs.retain(|b| b.name != blob);
            blobs.len() != before
        })
    }

    async fn delete_container(&self, account: &StorageAccountRef, container: &str) -> Result<()> {
        let key = (account.name.clone(), container.to_string());
        self.record_delete("container", container, |s| s.containers.remove(&key).is_some())
    }
}
