//! Deletion executor.
//!
//! Deletes one classified resource and, when asked to cascade, the resources
//! that only existed for it:
//!
//! - VM → its NICs → each NIC's public IPs → OS disk → data disks. Managed
//!   disks are deleted by id; unmanaged disks by deleting the VHD blob and
//!   then its container if that left it empty.
//! - NIC → its public IPs (captured before the NIC goes away).
//! - Blob → its container if that left it empty.
//!
//! Dependents covered by the whitelist are never touched. A whitelisted VHD
//! or any blob of a whitelisted container stays, and a whitelisted container
//! stays even when the cascade emptied it. They get `Protected` records.
//!
//! Every provider call returns only once the provider reports completion.
//! Nothing is retried. A failure on the primary resource is a
//! [`DeletionError`]; failures on dependents are `Failed` records in
//! [`Deleted`] and do not stop the rest of the cascade.

use std::future::Future;
use std::sync::Arc;

use crate::error::{DeletionError, Result, SweepError};
use crate::models::ResourceId;
use crate::policy::PolicyConfig;
use crate::provider::CloudProvider;
use crate::resources::{
    BlobLocation, DiskBacking, DiskRef, GroupScope, ManagedResource, NicResource,
    ResourceKind, StorageAccountRef, VmResource,
};
use crate::report::{Outcome, SweepRecord};

/// Records of dependents removed (or not) alongside the primary resource.
#[derive(Debug, Default)]
pub struct Deleted {
    pub records: Vec<SweepRecord>,
}

/// Identity of a dependent resource inside a cascade.
struct Dependent<'a> {
    kind: ResourceKind,
    name: &'a str,
    resource_group: &'a str,
    container: Option<&'a str>,
    parent: &'a str,
}

/// Whitelist check for a dependent. A container is its own scope.
fn is_protected(policy: &PolicyConfig, target: &Dependent<'_>) -> bool {
    let container = match target.kind {
        ResourceKind::Container => Some(target.name),
        _ => target.container,
    };
    policy.is_protected(target.name, container)
}

fn scope_of(id: &ResourceId) -> GroupScope {
    GroupScope::new(&id.subscription_id, &id.resource_group)
}

pub struct Executor {
    provider: Arc<dyn CloudProvider>,
    policy: PolicyConfig,
}

impl Executor {
    pub fn new(provider: Arc<dyn CloudProvider>, policy: PolicyConfig) -> Self {
        Executor { provider, policy }
    }


    pub async fn delete(
        &self,
        resource: &ManagedResource,
        cascade: bool,
    ) -> std::result::Result<Deleted, DeletionError> {
        self.delete_primary(resource).await.map_err(|source| {
            tracing::warn!(
                event = "sweep.delete.failed",
                kind = %resource.kind(),
                name = resource.name(),
                error = %source,
            );
            DeletionError {
                kind: resource.kind(),
                name: resource.name().to_string(),
                source,
            }
        })?;
        tracing::info!(
            event = "sweep.delete.completed",
            kind = %resource.kind(),
            name = resource.name(),
        );

        let mut deleted = Deleted::default();
        if !cascade {
            return Ok(deleted);
        }
        match resource {
            ManagedResource::VirtualMachine(vm) => self.cascade_vm(vm, &mut deleted).await,
            ManagedResource::NetworkInterface(nic) => {
                self.cascade_public_ips(&nic.public_ip_ids, &nic.name, &mut deleted)
                    .await
            }
            ManagedResource::UnmanagedBlob(blob) => {
                self.remove_container_if_empty(
                    &blob.account,
                    &blob.container,
                    &blob.name,
                    &mut deleted,
                )
                .await
            }
            ManagedResource::PublicIpAddress(_)
            | ManagedResource::ManagedDisk(_)
            | ManagedResource::Container(_) => {}
        }
        Ok(deleted)
    }

    async fn delete_primary(&self, resource: &ManagedResource) -> Result<()> {
        let p = &self.provider;
        match resource {
            ManagedResource::VirtualMachine(vm) => {
                p.delete_virtual_machine(&vm.scope, &vm.name).await
            }
            ManagedResource::NetworkInterface(nic) => {
                p.delete_network_interface(&nic.scope, &nic.name).await
            }
            ManagedResource::PublicIpAddress(ip) => p.delete_public_ip(&ip.scope, &ip.name).await,
            ManagedResource::ManagedDisk(disk) => p.delete_disk(&disk.scope, &disk.name).await,
            ManagedResource::UnmanagedBlob(blob) => {
                p.delete_blob(&blob.account, &blob.container, &blob.name)
                    .await
            }
            ManagedResource::Container(c) => p.delete_container(&c.account, &c.name).await,
        }
    }

    /// Runs one dependent deletion and records its outcome. Returns whether
    /// the dependent is gone; a protected one is left alone and `op` is
    /// never polled.
    async fn dependent<F>(&self, deleted: &mut Deleted, target: Dependent<'_>, op: F) -> bool
    where
        F: Future<Output = Result<()>>,
    {
        if is_protected(&self.policy, &target) {
            tracing::info!(
                event = "sweep.delete.protected",
                kind = %target.kind,
                name = target.name,
                parent = target.parent,
            );
            deleted.records.push(SweepRecord::cascaded(
                target.kind,
                target.name,
                target.resource_group,
                target.container,
                target.parent,
                Outcome::Protected,
            ));
            return false;
        }
        let Dependent {
            kind,
            name,
            resource_group,
            container,
            parent,
        } = target;
        let outcome = match op.await {
            Ok(()) => {
                tracing::info!(
                    event = "sweep.delete.cascaded",
                    kind = %kind,
                    name,
                    parent,
                );
                Outcome::Deleted
            }
            Err(e) => {
                tracing::warn!(
                    event = "sweep.delete.cascade_failed",
                    kind = %kind,
                    name,
                    parent,
                    error = %e,
                );
                Outcome::Failed {
                    message: e.to_string(),
                }
            }
        };
        let ok = outcome == Outcome::Deleted;
        deleted.records.push(SweepRecord::cascaded(
            kind,
            name,
            resource_group,
            container,
            parent,
            outcome,
        ));
        ok
    }

    fn unresolvable(
        deleted: &mut Deleted,
        kind: ResourceKind,
        name: &str,
        parent: &str,
        error: SweepError,
    ) {
        tracing::warn!(
            event = "sweep.delete.cascade_failed",
            kind = %kind,
            name,
            parent,
            error = %error,
        );
        deleted.records.push(SweepRecord::cascaded(
            kind,
            name,
            "",
            None,
            parent,
            Outcome::Failed {
                message: error.to_string(),
            },
        ));
    }

    async fn cascade_vm(&self, vm: &VmResource, deleted: &mut Deleted) {
        for nic_id in &vm.nic_ids {
            let id = match ResourceId::parse(nic_id) {
                Ok(id) => id,
                Err(e) => {
                    Self::unresolvable(deleted, ResourceKind::NetworkInterface, nic_id, &vm.name, e);
                    continue;
                }
            };
            let scope = scope_of(&id);
            // The public IP reference is unreachable once the NIC is gone.
            let nic = match self.provider.get_network_interface(&scope, &id.name).await {
                Ok(nic) => NicResource {
                    scope: scope.clone(),
                    name: nic.name.clone(),
                    virtual_machine: None,
                    public_ip_ids: nic.public_ip_ids(),
                },
                Err(e) => {
                    Self::unresolvable(deleted, ResourceKind::NetworkInterface, &id.name, &vm.name, e);
                    continue;
                }
            };
            let target = Dependent {
                kind: ResourceKind::NetworkInterface,
                name: &nic.name,
                resource_group: &scope.resource_group,
                container: None,
                parent: &vm.name,
            };
            let op = self.provider.delete_network_interface(&scope, &nic.name);
            if self.dependent(deleted, target, op).await {
                self.cascade_public_ips(&nic.public_ip_ids, &nic.name, deleted)
                    .await;
            }
        }

        for disk in vm.os_disk.iter().chain(vm.data_disks.iter()) {
            self.delete_disk(disk, &vm.scope, &vm.name, deleted).await;
        }
    }

    async fn cascade_public_ips(&self, ip_ids: &[String], parent: &str, deleted: &mut Deleted) {
        for ip_id in ip_ids {
            let id = match ResourceId::parse(ip_id) {
                Ok(id) => id,
                Err(e) => {
                    Self::unresolvable(deleted, ResourceKind::PublicIpAddress, ip_id, parent, e);
                    continue;
                }
            };
            let scope = scope_of(&id);
            let target = Dependent {
                kind: ResourceKind::PublicIpAddress,
                name: &id.name,
                resource_group: &id.resource_group,
                container: None,
                parent,
            };
            let op = self.provider.delete_public_ip(&scope, &id.name);
            self.dependent(deleted, target, op).await;
        }
    }

    async fn delete_disk(
        &self,
        disk: &DiskRef,
        vm_scope: &GroupScope,
        parent: &str,
        deleted: &mut Deleted,
    ) {
        match &disk.backing {
            DiskBacking::Managed { id } => {
                let id = match ResourceId::parse(id) {
                    Ok(id) => id,
                    Err(e) => {
                        Self::unresolvable(deleted, ResourceKind::ManagedDisk, &disk.name, parent, e);
                        return;
                    }
                };
                let scope = scope_of(&id);
                let target = Dependent {
                    kind: ResourceKind::ManagedDisk,
                    name: &id.name,
                    resource_group: &id.resource_group,
                    container: None,
                    parent,
                };
                let op = self.provider.delete_disk(&scope, &id.name);
                self.dependent(deleted, target, op).await;
            }
            DiskBacking::Unmanaged { uri } => {
                let location = match BlobLocation::parse(uri) {
                    Ok(l) => l,
                    Err(e) => {
                        Self::unresolvable(deleted, ResourceKind::Blob, &disk.name, parent, e);
                        return;
                    }
                };
                let account = match self
                    .provider
                    .find_storage_account(&vm_scope.subscription_id, &location.account)
                    .await
                {
                    Ok(Some(account)) => account,
                    Ok(None) => {
                        let e = SweepError::ScopeNotFound {
                            scope: format!("storage account '{}'", location.account),
                        };
                        Self::unresolvable(deleted, ResourceKind::Blob, &location.blob, parent, e);
                        return;
                    }
                    Err(e) => {
                        Self::unresolvable(deleted, ResourceKind::Blob, &location.blob, parent, e);
                        return;
                    }
                };
                let target = Dependent {
                    kind: ResourceKind::Blob,
                    name: &location.blob,
                    resource_group: &account.resource_group,
                    container: Some(&location.container),
                    parent,
                };
                let op = self
                    .provider
                    .delete_blob(&account, &location.container, &location.blob);
                if self.dependent(deleted, target, op).await {
                    self.remove_container_if_empty(&account, &location.container, parent, deleted)
                        .await;
                }
            }
        }
    }

    /// Re-lists `container` and deletes it when no blobs remain.
    async fn remove_container_if_empty(
        &self,
        account: &StorageAccountRef,
        container: &str,
        parent: &str,
        deleted: &mut Deleted,
    ) {
        match self.provider.list_blobs(account, container).await {
            Ok(blobs) if blobs.is_empty() => {
                let target = Dependent {
                    kind: ResourceKind::Container,
                    name: container,
                    resource_group: &account.resource_group,
                    container: None,
                    parent,
                };
                let op = self.provider.delete_container(account, container);
                self.dependent(deleted, target, op).await;
            }
            Ok(blobs) => {
                tracing::debug!(
                    event = "sweep.delete.container_kept",
                    container,
                    remaining = blobs.len(),
                );
            }
            Err(e) => Self::unresolvable(deleted, ResourceKind::Container, container, parent, e),
        }
    }
}
