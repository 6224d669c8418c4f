//! Read-only listings for operators.
//!
//! Shows what a subscription or group holds and in what state, the same
//! facts the sweep classifies on: VM power state and addresses, NIC
//! attachment, container and VHD leases. Nothing here mutates.
//!
//! ```text
//! vm1: VM running; public 20.1.2.3; private 10.0.0.4
//! vm1-nic: attached to vm1
//! nic-orphan: Available
//! ddvestg/vhds/old.vhd: unlocked/available
//! ```

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::classify::power_state;
use crate::error::{Result, SweepError};
use crate::models::{NetworkInterface, ResourceId};
use crate::provider::CloudProvider;
use crate::resources::{GroupScope, StorageAccountRef};
use crate::storage::BlobItem;

/// One listed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Row {
    ResourceGroup {
        name: String,
        location: Option<String>,
    },
    StorageAccount {
        resource_group: String,
        name: String,
    },
    VirtualMachine {
        name: String,
        /// Display status of the power state slot, e.g. `VM running`.
        status: Option<String>,
        public_ips: Vec<String>,
        private_ips: Vec<String>,
    },
    NetworkInterface {
        name: String,
        /// Name of the VM holding the NIC; `None` when it is free.
        attached_to: Option<String>,
    },
    Container {
        account: String,
        name: String,
        lease_status: Option<String>,
        lease_state: Option<String>,
    },
    Vhd {
        account: String,
        container: String,
        name: String,
        lease_status: Option<String>,
        lease_state: Option<String>,
    },
}

fn lease(status: &Option<String>, state: &Option<String>) -> String {
    format!(
        "{}/{}",
        status.as_deref().unwrap_or("unknown"),
        state.as_deref().unwrap_or("unknown")
    )
}

fn addresses(ips: &[String]) -> String {
    if ips.is_empty() {
        "none".to_string()
    } else {
        ips.join(", ")
    }
}

impl Row {
    pub fn line(&self) -> String {
        match self {
            Row::ResourceGroup { name, location } => match location {
                Some(location) => format!("{name} ({location})"),
                None => name.clone(),
            },
            Row::StorageAccount {
                resource_group,
                name,
            } => format!("{resource_group}/{name}"),
            Row::VirtualMachine {
                name,
                status,
                public_ips,
                private_ips,
            } => format!(
                "{name}: {}; public {}; private {}",
                status.as_deref().unwrap_or("unknown"),
                addresses(public_ips),
                addresses(private_ips)
            ),
            Row::NetworkInterface { name, attached_to } => match attached_to {
                Some(vm) => format!("{name}: attached to {vm}"),
                None => format!("{name}: Available"),
            },
            Row::Container {
                account,
                name,
                lease_status,
                lease_state,
            } => format!("{account}/{name}: {}", lease(lease_status, lease_state)),
            Row::Vhd {
                account,
                container,
                name,
                lease_status,
                lease_state,
            } => format!(
                "{account}/{container}/{name}: {}",
                lease(lease_status, lease_state)
            ),
        }
    }
}

/// Resolves a named group, failing with `ScopeNotFound` when it is missing.
pub async fn group(
    provider: &dyn CloudProvider,
    subscription_id: &str,
    resource_group: &str,
) -> Result<GroupScope> {
    if !provider
        .resource_group_exists(subscription_id, resource_group)
        .await?
    {
        return Err(SweepError::ScopeNotFound {
            scope: format!(
                "resource group '{resource_group}' in subscription '{subscription_id}'"
            ),
        });
    }
    Ok(GroupScope::new(subscription_id, resource_group))
}

pub async fn resource_groups(provider: &dyn CloudProvider, subscription_id: &str) -> Result<Vec<Row>> {
    Ok(provider
        .list_resource_groups(subscription_id)
        .await?
        .into_iter()
        .map(|rg| Row::ResourceGroup {
            name: rg.name,
            location: rg.location,
        })
        .collect())
}

/// Storage accounts of one group, or of every group in the subscription.
pub async fn storage_accounts(
    provider: &dyn CloudProvider,
    subscription_id: &str,
    scope: Option<&GroupScope>,
) -> Result<Vec<Row>> {
    let scopes = match scope {
        Some(scope) => vec![scope.clone()],
        None => provider
            .list_resource_groups(subscription_id)
            .await?
            .into_iter()
            .map(|rg| GroupScope::new(subscription_id, &rg.name))
            .collect(),
    };
    let mut rows = Vec::new();
    for scope in &scopes {
        rows.extend(
            provider
                .list_storage_accounts(scope)
                .await?
                .into_iter()
                .map(|account| Row::StorageAccount {
                    resource_group: account.resource_group,
                    name: account.name,
                }),
        );
    }
    Ok(rows)
}

/// Public IP addresses by lowercased resource id, loaded one group at a
/// time as references into that group show up.
struct AddressBook<'a> {
    provider: &'a dyn CloudProvider,
    loaded: HashSet<GroupScope>,
    addresses: HashMap<String, String>,
}

impl<'a> AddressBook<'a> {
    fn new(provider: &'a dyn CloudProvider) -> Self {
        AddressBook {
            provider,
            loaded: HashSet::new(),
            addresses: HashMap::new(),
        }
    }

    async fn address_of(&mut self, ip_id: &str) -> Result<Option<String>> {
        let id = ResourceId::parse(ip_id)?;
        let scope = GroupScope::new(&id.subscription_id, &id.resource_group);
        if self.loaded.insert(scope.clone()) {
            for ip in self.provider.list_public_ips(&scope).await? {
                if let Some(address) = ip.properties.ip_address {
                    self.addresses.insert(ip.id.to_lowercase(), address);
                }
            }
        }
        Ok(self.addresses.get(&ip_id.to_lowercase()).cloned())
    }
}

/// VMs of the group with power state and the addresses of their NICs.
///
/// NICs and public IPs outside the VM's group are fetched from their own
/// group.
pub async fn virtual_machines(provider: &dyn CloudProvider, scope: &GroupScope) -> Result<Vec<Row>> {
    let local_nics: HashMap<String, NetworkInterface> = provider
        .list_network_interfaces(scope)
        .await?
        .into_iter()
        .map(|nic| (nic.id.to_lowercase(), nic))
        .collect();
    let mut book = AddressBook::new(provider);

    let mut rows = Vec::new();
    for listed in provider.list_virtual_machines(scope).await? {
        let vm = provider.get_virtual_machine(scope, &listed.name).await?;
        let statuses = vm
            .properties
            .instance_view
            .as_ref()
            .map(|v| v.statuses.as_slice())
            .unwrap_or_default();
        let status = power_state(statuses)
            .and_then(|s| s.display_status.clone().or_else(|| s.code.clone()));

        let mut public_ips = Vec::new();
        let mut private_ips = Vec::new();
        for nic_ref in &vm.properties.network_profile.network_interfaces {
            let nic = match local_nics.get(&nic_ref.id.to_lowercase()) {
                Some(nic) => nic.clone(),
                None => {
                    let id = ResourceId::parse(&nic_ref.id)?;
                    let nic_scope = GroupScope::new(&id.subscription_id, &id.resource_group);
                    provider.get_network_interface(&nic_scope, &id.name).await?
                }
            };
            private_ips.extend(
                nic.properties
                    .ip_configurations
                    .iter()
                    .filter_map(|c| c.properties.private_ip_address.clone()),
            );
            for ip_id in nic.public_ip_ids() {
                if let Some(address) = book.address_of(&ip_id).await? {
                    public_ips.push(address);
                }
            }
        }

        rows.push(Row::VirtualMachine {
            name: vm.name,
            status,
            public_ips,
            private_ips,
        });
    }
    Ok(rows)
}

/// NICs of the group, each either free or attached to a VM.
pub async fn network_interfaces(provider: &dyn CloudProvider, scope: &GroupScope) -> Result<Vec<Row>> {
    Ok(provider
        .list_network_interfaces(scope)
        .await?
        .into_iter()
        .map(|nic| {
            let attached_to = nic.properties.virtual_machine.map(|r| {
                ResourceId::parse(&r.id).map_or(r.id, |id| id.name)
            });
            Row::NetworkInterface {
                name: nic.name,
                attached_to,
            }
        })
        .collect())
}

/// Storage accounts of the group, narrowed to `account` when given.
async fn accounts(
    provider: &dyn CloudProvider,
    scope: &GroupScope,
    account: Option<&str>,
) -> Result<Vec<StorageAccountRef>> {
    let all = provider.list_storage_accounts(scope).await?;
    let Some(wanted) = account else {
        return Ok(all);
    };
    let matching: Vec<StorageAccountRef> = all.into_iter().filter(|a| a.name == wanted).collect();
    if matching.is_empty() {
        return Err(SweepError::ScopeNotFound {
            scope: format!("storage account '{wanted}' in {scope}"),
        });
    }
    Ok(matching)
}

pub async fn containers(
    provider: &dyn CloudProvider,
    scope: &GroupScope,
    account: Option<&str>,
) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for account in accounts(provider, scope, account).await? {
        rows.extend(
            provider
                .list_containers(&account)
                .await?
                .into_iter()
                .map(|c| Row::Container {
                    account: account.name.clone(),
                    name: c.name,
                    lease_status: c.properties.lease_status,
                    lease_state: c.properties.lease_state,
                }),
        );
    }
    Ok(rows)
}

/// VHD blobs with their lease, optionally narrowed to one account and one
/// container. Other blobs are left out.
pub async fn vhds(
    provider: &dyn CloudProvider,
    scope: &GroupScope,
    account: Option<&str>,
    container: Option<&str>,
) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for account in accounts(provider, scope, account).await? {
        let names = match container {
            Some(c) => vec![c.to_string()],
            None => provider
                .list_containers(&account)
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect(),
        };
        for container in names {
            let blobs = provider.list_blobs(&account, &container).await?;
            rows.extend(blobs.into_iter().filter(BlobItem::is_vhd).map(|b| Row::Vhd {
                account: account.name.clone(),
                container: container.clone(),
                name: b.name,
                lease_status: b.properties.lease_status,
                lease_state: b.properties.lease_state,
            }));
        }
    }
    Ok(rows)
}
