//! Resource enumeration per resource group and kind.
//!
//! Every call re-queries the provider. A failed top-level list call is an
//! error for that kind; a failure while expanding a single resource (one VM's
//! instance view, one storage account's containers, one container's blobs)
//! skips that resource and is recorded in [`Enumeration::skipped`].

use crate::error::Result;
use crate::provider::CloudProvider;
use crate::resources::{
    BlobResource, ContainerResource, DiskResource, GroupScope, ManagedResource, NicResource,
    PublicIpResource, ResourceKind, VmResource,
};
use crate::storage::BlobItem;

/// A resource that could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// What was being expanded, e.g. `VM vm1` or `Container sa/vhds`.
    pub resource: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Enumeration {
    pub resources: Vec<ManagedResource>,
    pub skipped: Vec<Skipped>,
}

impl Enumeration {
    fn skip(&mut self, resource: String, error: &crate::error::SweepError) {
        tracing::warn!(
            event = "sweep.enumerate.skipped",
            resource = %resource,
            error = %error,
        );
        self.skipped.push(Skipped {
            resource,
            message: error.to_string(),
        });
    }
}

/// Enumerates one kind in one resource group.
pub async fn enumerate(
    provider: &dyn CloudProvider,
    scope: &GroupScope,
    kind: ResourceKind,
) -> Result<Enumeration> {
    match kind {
        ResourceKind::VirtualMachine => virtual_machines(provider, scope).await,
        ResourceKind::NetworkInterface => network_interfaces(provider, scope).await,
        ResourceKind::PublicIpAddress => public_ips(provider, scope).await,
        ResourceKind::ManagedDisk => managed_disks(provider, scope).await,
        ResourceKind::Blob | ResourceKind::Container => {
            let mut all = storage(provider, scope).await?;
            all.resources.retain(|r| r.kind() == kind);
            Ok(all)
        }
    }
}

/// Lists VMs, then fetches each one with its instance view.
pub async fn virtual_machines(
    provider: &dyn CloudProvider,
    scope: &GroupScope,
) -> Result<Enumeration> {
    let mut out = Enumeration::default();
    for listed in provider.list_virtual_machines(scope).await? {
        match provider.get_virtual_machine(scope, &listed.name).await {
            Ok(vm) => out
                .resources
                .push(ManagedResource::VirtualMachine(VmResource::from_model(scope, &vm))),
            Err(e) => out.skip(format!("VM {}", listed.name), &e),
        }
    }
    Ok(out)
}

pub async fn network_interfaces(
    provider: &dyn CloudProvider,
    scope: &GroupScope,
) -> Result<Enumeration> {
    let resources = provider
        .list_network_interfaces(scope)
        .await?
        .into_iter()
        .map(|nic| {
            let public_ip_ids = nic.public_ip_ids();
            ManagedResource::NetworkInterface(NicResource {
                scope: scope.clone(),
                name: nic.name,
                virtual_machine: nic.properties.virtual_machine.map(|r| r.id),
                public_ip_ids,
            })
        })
        .collect();
    Ok(Enumeration {
        resources,
        skipped: Vec::new(),
    })
}

pub async fn public_ips(provider: &dyn CloudProvider, scope: &GroupScope) -> Result<Enumeration> {
    let resources = provider
        .list_public_ips(scope)
        .await?
        .into_iter()
        .map(|ip| {
            ManagedResource::PublicIpAddress(PublicIpResource {
                scope: scope.clone(),
                name: ip.name,
                ip_address: ip.properties.ip_address,
            })
        })
        .collect();
    Ok(Enumeration {
        resources,
        skipped: Vec::new(),
    })
}

pub async fn managed_disks(
    provider: &dyn CloudProvider,
    scope: &GroupScope,
) -> Result<Enumeration> {
    let resources = provider
        .list_disks(scope)
        .await?
        .into_iter()
        .map(|disk| {
            ManagedResource::ManagedDisk(DiskResource {
                scope: scope.clone(),
                name: disk.name,
                managed_by: disk.managed_by,
            })
        })
        .collect();
    Ok(Enumeration {
        resources,
        skipped: Vec::new(),
    })
}

/// Containers and VHD blobs of every storage account in the group.
///
/// Each container is yielded before its blobs. `blob_count` counts every
/// blob in the container, VHD or not.
pub async fn storage(provider: &dyn CloudProvider, scope: &GroupScope) -> Result<Enumeration> {
    let mut out = Enumeration::default();
    for account in provider.list_storage_accounts(scope).await? {
        let containers = match provider.list_containers(&account).await {
            Ok(c) => c,
            Err(e) => {
                out.skip(format!("Storage account {}", account.name), &e);
                continue;
            }
        };
        for container in containers {
            let blobs = match provider.list_blobs(&account, &container.name).await {
                Ok(b) => b,
                Err(e) => {
                    out.skip(format!("Container {}/{}", account.name, container.name), &e);
                    continue;
                }
            };
            let has_leased_blob = blobs.iter().any(|b| {
                b.properties
                    .lease_state
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case("leased"))
            });
            out.resources.push(ManagedResource::Container(ContainerResource {
                account: account.clone(),
                name: container.name.clone(),
                blob_count: blobs.len(),
                has_leased_blob,
            }));
            // Non-disk blobs keep the container occupied but are never candidates.
            out.resources.extend(blobs.into_iter().filter(BlobItem::is_vhd).map(|b| {
                ManagedResource::UnmanagedBlob(BlobResource {
                    account: account.clone(),
                    container: container.name.clone(),
                    name: b.name,
                    lease_status: b.properties.lease_status,
                    lease_state: b.properties.lease_state,
                })
            }));
        }
    }
    Ok(out)
}
