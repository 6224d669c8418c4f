//! The cloud provider seam.
//!
//! [`CloudProvider`] is everything the sweep needs from Azure: list-by-scope
//! for each resource kind, a VM getter that expands the instance view,
//! delete-by-name for each kind (returning only once the provider has
//! finished), and Blob service list/delete keyed by storage account.
//!
//! [`AzureProvider`] binds the trait to the ARM REST API and the Blob service.
//! Tests substitute an in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::client::ArmClient;
use crate::error::{Result, SweepError};
use crate::models::{
    COMPUTE_API_VERSION, DISKS_API_VERSION, Disk, NETWORK_API_VERSION, NetworkInterface,
    PublicIpAddress, RESOURCES_API_VERSION, ResourceGroup, ResourceId, STORAGE_API_VERSION,
    SUBSCRIPTIONS_API_VERSION, StorageAccount, StorageAccountKeys, Subscription, VirtualMachine,
};
use crate::resources::{GroupScope, StorageAccountRef};
use crate::storage::{BlobClient, BlobItem, ContainerItem};

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    async fn subscription_exists(&self, subscription_id: &str) -> Result<bool>;

    async fn list_resource_groups(&self, subscription_id: &str) -> Result<Vec<ResourceGroup>>;

    async fn resource_group_exists(&self, subscription_id: &str, resource_group: &str)
    -> Result<bool>;

    /// VMs in the group, without instance view.
    async fn list_virtual_machines(&self, scope: &GroupScope) -> Result<Vec<VirtualMachine>>;

    /// A single VM with `$expand=instanceView`.
    async fn get_virtual_machine(&self, scope: &GroupScope, name: &str) -> Result<VirtualMachine>;

    async fn list_network_interfaces(&self, scope: &GroupScope) -> Result<Vec<NetworkInterface>>;

    async fn get_network_interface(
        &self,
        scope: &GroupScope,
        name: &str,
    ) -> Result<NetworkInterface>;

    async fn list_public_ips(&self, scope: &GroupScope) -> Result<Vec<PublicIpAddress>>;

    async fn list_disks(&self, scope: &GroupScope) -> Result<Vec<Disk>>;

    async fn list_storage_accounts(&self, scope: &GroupScope) -> Result<Vec<StorageAccountRef>>;

    /// Looks a storage account up by name anywhere in the subscription.
    /// VHD URIs carry only the account name, not its resource group.
    async fn find_storage_account(
        &self,
        subscription_id: &str,
        name: &str,
    ) -> Result<Option<StorageAccountRef>>;

    async fn list_containers(&self, account: &StorageAccountRef) -> Result<Vec<ContainerItem>>;

    async fn list_blobs(&self, account: &StorageAccountRef, container: &str)
    -> Result<Vec<BlobItem>>;

    async fn delete_virtual_machine(&self, scope: &GroupScope, name: &str) -> Result<()>;

    async fn delete_network_interface(&self, scope: &GroupScope, name: &str) -> Result<()>;

    async fn delete_public_ip(&self, scope: &GroupScope, name: &str) -> Result<()>;

    async fn delete_disk(&self, scope: &GroupScope, name: &str) -> Result<()>;

    async fn delete_blob(&self, account: &StorageAccountRef, container: &str, blob: &str)
    -> Result<()>;

    async fn delete_container(&self, account: &StorageAccountRef, container: &str) -> Result<()>;
}

fn group_path(scope: &GroupScope) -> String {
    format!(
        "subscriptions/{}/resourceGroups/{}",
        scope.subscription_id, scope.resource_group
    )
}

fn resource_path(scope: &GroupScope, provider_type: &str, name: &str, api_version: &str) -> String {
    format!(
        "{}/providers/{provider_type}/{name}?api-version={api_version}",
        group_path(scope)
    )
}

fn collection_path(scope: &GroupScope, provider_type: &str, api_version: &str) -> String {
    format!(
        "{}/providers/{provider_type}?api-version={api_version}",
        group_path(scope)
    )
}

fn account_ref(subscription_id: &str, account: &StorageAccount) -> Result<StorageAccountRef> {
    let id = ResourceId::parse(&account.id)?;
    Ok(StorageAccountRef {
        subscription_id: subscription_id.to_string(),
        resource_group: id.resource_group,
        name: account.name.clone(),
    })
}

/// [`CloudProvider`] backed by ARM and the Blob service.
///
/// Storage account keys are fetched with `listKeys` on first use and kept for
/// the lifetime of the provider.
pub struct AzureProvider {
    arm: ArmClient,
    blob_endpoint_template: String,
    account_keys: Mutex<HashMap<StorageAccountRef, String>>,
}

impl AzureProvider {
    pub fn new(arm: ArmClient, blob_endpoint_template: &str) -> Self {
        AzureProvider {
            arm,
            blob_endpoint_template: blob_endpoint_template.to_string(),
            account_keys: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying ARM client, for operations outside the sweep.
    pub fn arm(&self) -> &ArmClient {
        &self.arm
    }

    async fn blob_client(&self, account: &StorageAccountRef) -> Result<BlobClient> {
        let mut keys = self.account_keys.lock().await;
        let key = match keys.get(account) {
            Some(key) => key.clone(),
            None => {
                let scope = GroupScope::new(&account.subscription_id, &account.resource_group);
                let path = format!(
                    "{}/providers/Microsoft.Storage/storageAccounts/{}/listKeys?api-version={STORAGE_API_VERSION}",
                    group_path(&scope),
                    account.name
                );
                let listed: StorageAccountKeys =
                    self.arm.post(&path, &serde_json::json!({})).await?;
                let key = listed
                    .keys
                    .into_iter()
                    .next()
                    .map(|k| k.value)
                    .ok_or_else(|| {
                        SweepError::Misconfiguration(format!(
                            "storage account {} returned no access keys",
                            account.name
                        ))
                    })?;
                tracing::debug!(event = "storage.account.key_fetched", account = %account.name);
                keys.insert(account.clone(), key.clone());
                key
            }
        };
        BlobClient::new(&account.name, &key, &self.blob_endpoint_template)
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.arm
            .get_all(&format!("subscriptions?api-version={SUBSCRIPTIONS_API_VERSION}"))
            .await
    }

    async fn subscription_exists(&self, subscription_id: &str) -> Result<bool> {
        self.arm
            .exists(&format!(
                "subscriptions/{subscription_id}?api-version={SUBSCRIPTIONS_API_VERSION}"
            ))
            .await
    }

    async fn list_resource_groups(&self, subscription_id: &str) -> Result<Vec<ResourceGroup>> {
        self.arm
            .get_all(&format!(
                "subscriptions/{subscription_id}/resourcegroups?api-version={RESOURCES_API_VERSION}"
            ))
            .await
    }

    async fn resource_group_exists(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<bool> {
        self.arm
            .exists(&format!(
                "subscriptions/{subscription_id}/resourcegroups/{resource_group}?api-version={RESOURCES_API_VERSION}"
            ))
            .await
    }

    async fn list_virtual_machines(&self, scope: &GroupScope) -> Result<Vec<VirtualMachine>> {
        self.arm
            .get_all(&collection_path(
                scope,
                "Microsoft.Compute/virtualMachines",
                COMPUTE_API_VERSION,
            ))
            .await
    }

    async fn get_virtual_machine(&self, scope: &GroupScope, name: &str) -> Result<VirtualMachine> {
        let path = format!(
            "{}/providers/Microsoft.Compute/virtualMachines/{name}?$expand=instanceView&api-version={COMPUTE_API_VERSION}",
            group_path(scope)
        );
        self.arm.get(&path).await
    }

    async fn list_network_interfaces(&self, scope: &GroupScope) -> Result<Vec<NetworkInterface>> {
        self.arm
            .get_all(&collection_path(
                scope,
                "Microsoft.Network/networkInterfaces",
                NETWORK_API_VERSION,
            ))
            .await
    }

    async fn get_network_interface(
        &self,
        scope: &GroupScope,
        name: &str,
    ) -> Result<NetworkInterface> {
        self.arm
            .get(&resource_path(
                scope,
                "Microsoft.Network/networkInterfaces",
                name,
                NETWORK_API_VERSION,
            ))
            .await
    }

    async fn list_public_ips(&self, scope: &GroupScope) -> Result<Vec<PublicIpAddress>> {
        self.arm
            .get_all(&collection_path(
                scope,
                "Microsoft.Network/publicIPAddresses",
                NETWORK_API_VERSION,
            ))
            .await
    }

    async fn list_disks(&self, scope: &GroupScope) -> Result<Vec<Disk>> {
        self.arm
            .get_all(&collection_path(
                scope,
                "Microsoft.Compute/disks",
                DISKS_API_VERSION,
            ))
            .await
    }

    async fn list_storage_accounts(&self, scope: &GroupScope) -> Result<Vec<StorageAccountRef>> {
        let accounts: Vec<StorageAccount> = self
            .arm
            .get_all(&collection_path(
                scope,
                "Microsoft.Storage/storageAccounts",
                STORAGE_API_VERSION,
            ))
            .await?;
        accounts
            .iter()
            .map(|a| account_ref(&scope.subscription_id, a))
            .collect()
    }

    async fn find_storage_account(
        &self,
        subscription_id: &str,
        name: &str,
    ) -> Result<Option<StorageAccountRef>> {
        let accounts: Vec<StorageAccount> = self
            .arm
            .get_all(&format!(
                "subscriptions/{subscription_id}/providers/Microsoft.Storage/storageAccounts?api-version={STORAGE_API_VERSION}"
            ))
            .await?;
        accounts
            .iter()
            .find(|a| a.name == name)
            .map(|a| account_ref(subscription_id, a))
            .transpose()
    }

    async fn list_containers(&self, account: &StorageAccountRef) -> Result<Vec<ContainerItem>> {
        self.blob_client(account).await?.list_containers().await
    }

    async fn list_blobs(
        &self,
        account: &StorageAccountRef,
        container: &str,
    ) -> Result<Vec<BlobItem>> {
        self.blob_client(account).await?.list_blobs(container).await
    }

    async fn delete_virtual_machine(&self, scope: &GroupScope, name: &str) -> Result<()> {
        self.arm
            .delete(&resource_path(
                scope,
                "Microsoft.Compute/virtualMachines",
                name,
                COMPUTE_API_VERSION,
            ))
            .await
    }

    async fn delete_network_interface(&self, scope: &GroupScope, name: &str) -> Result<()> {
        self.arm
            .delete(&resource_path(
                scope,
                "Microsoft.Network/networkInterfaces",
                name,
                NETWORK_API_VERSION,
            ))
            .await
    }

    async fn delete_public_ip(&self, scope: &GroupScope, name: &str) -> Result<()> {
        self.arm
            .delete(&resource_path(
                scope,
                "Microsoft.Network/publicIPAddresses",
                name,
                NETWORK_API_VERSION,
            ))
            .await
    }

    async fn delete_disk(&self, scope: &GroupScope, name: &str) -> Result<()> {
        self.arm
            .delete(&resource_path(
                scope,
                "Microsoft.Compute/disks",
                name,
                DISKS_API_VERSION,
            ))
            .await
    }

    async fn delete_blob(
        &self,
        account: &StorageAccountRef,
        container: &str,
        blob: &str,
    ) -> Result<()> {
        self.blob_client(account)
            .await?
            .delete_blob(container, blob)
            .await
    }

    async fn delete_container(&self, account: &StorageAccountRef, container: &str) -> Result<()> {
        self.blob_client(account)
            .await?
            .delete_container(container)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_paths_are_relative_and_versioned() {
        let scope = GroupScope::new("sub-1", "rg-1");
        assert_eq!(
            resource_path(&scope, "Microsoft.Compute/disks", "d1", "2023-04-02"),
            "subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Compute/disks/d1?api-version=2023-04-02"
        );
        assert_eq!(
            collection_path(&scope, "Microsoft.Network/networkInterfaces", "v"),
            "subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Network/networkInterfaces?api-version=v"
        );
    }

    #[test]
    fn storage_account_ref_takes_group_from_id() {
        let account = StorageAccount {
            id: "/subscriptions/sub-1/resourceGroups/Storage-RG/providers/Microsoft.Storage/storageAccounts/ddvestg".into(),
            name: "ddvestg".into(),
        };
        let r = account_ref("sub-1", &account).unwrap();
        assert_eq!(r.resource_group, "Storage-RG");
        assert_eq!(r.name, "ddvestg");
    }

    #[test]
    fn storage_account_with_malformed_id_is_rejected() {
        let account = StorageAccount {
            id: "garbage".into(),
            name: "x".into(),
        };
        assert!(account_ref("sub-1", &account).is_err());
    }
}
