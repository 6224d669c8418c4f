//! Sweep orchestration.
//!
//! [`Sweeper::run`] resolves the scope (one group, every group of one
//! subscription, or every group of every subscription not excluded by
//! policy), then sweeps each resource group in a fixed phase order:
//!
//! 1. VMs (deleting a VM cascades into its NICs, public IPs and disks)
//! 2. managed disks
//! 3. storage: containers and unmanaged VHD blobs
//! 4. NICs (cascading into their public IPs)
//! 5. public IPs
//!
//! Sweeping VMs first means resources freed by a VM deletion are not
//! counted twice. Each phase classifies everything it enumerated before the
//! first deletion. Disk, NIC and public IP deletions are independent and run
//! with up to `concurrency` in flight; the VM and storage phases stay
//! sequential because container emptiness checks depend on order.
//!
//! Only scope resolution for an explicitly named scope is fatal. Everything
//! inside a group is recovered and kept in the [`SweepReport`].

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;

use crate::classify::{classify, is_boot_diagnostics_container, is_wrong_usage_container};
use crate::delete::Executor;
use crate::enumerate::{self, Enumeration};
use crate::error::{Result, SweepError};
use crate::policy::PolicyConfig;
use crate::provider::CloudProvider;
use crate::report::{FailedScope, Finding, GroupReport, SweepRecord, SweepReport};
use crate::resources::{GroupScope, ManagedResource, ResourceKind};

/// Whether the sweep only reports or also deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepMode {
    /// Report orphans; never call a delete operation.
    #[default]
    DryRun,
    /// Delete orphans and report the outcome of each deletion.
    Apply,
}

pub struct Sweeper {
    provider: Arc<dyn CloudProvider>,
    executor: Executor,
    policy: PolicyConfig,
    mode: SweepMode,
    concurrency: usize,
}

/// A resource selected for reporting or deletion.
struct Candidate {
    resource: ManagedResource,
    finding: Finding,
    cascade: bool,
}

impl Sweeper {
    pub fn new(provider: Arc<dyn CloudProvider>, policy: PolicyConfig, mode: SweepMode) -> Self {
        Sweeper {
            executor: Executor::new(Arc::clone(&provider), policy.clone()),
            provider,
            policy,
            mode,
            concurrency: 1,
        }
    }

    /// Maximum deletions in flight during the disk, NIC and public IP
    /// phases. Values below 1 are treated as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sweeps the given scope.
    ///
    /// # Errors
    ///
    /// - `SweepError::ScopeNotFound` when a named subscription, or a named
    ///   group inside a named subscription, does not exist.
    /// - Any provider error raised while listing subscriptions, or while
    ///   listing the groups of a named subscription.
    pub async fn run(
        &self,
        subscription: Option<&str>,
        resource_group: Option<&str>,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let scopes = match subscription {
            Some(sub) => self.resolve_subscription(sub, resource_group).await?,
            None => self.resolve_all(resource_group, &mut report).await?,
        };

        tracing::info!(
            event = "sweep.run.started",
            groups = scopes.len(),
            mode = ?self.mode,
        );
        for scope in &scopes {
            report.groups.push(self.sweep_group(scope).await);
        }
        tracing::info!(
            event = "sweep.run.completed",
            groups = report.groups.len(),
            reported = report.reported_count(),
            deleted = report.deleted_count(),
            failed = report.failed_count(),
        );
        Ok(report)
    }

    async fn resolve_subscription(
        &self,
        subscription: &str,
        resource_group: Option<&str>,
    ) -> Result<Vec<GroupScope>> {
        if !self.provider.subscription_exists(subscription).await? {
            return Err(SweepError::ScopeNotFound {
                scope: format!("subscription '{subscription}'"),
            });
        }
        match resource_group {
            Some(rg) => {
                if !self
                    .provider
                    .resource_group_exists(subscription, rg)
                    .await?
                {
                    return Err(SweepError::ScopeNotFound {
                        scope: format!("resource group '{rg}' in subscription '{subscription}'"),
                    });
                }
                Ok(vec![GroupScope::new(subscription, rg)])
            }
            None => Ok(self
                .provider
                .list_resource_groups(subscription)
                .await?
                .iter()
                .map(|g| GroupScope::new(subscription, &g.name))
                .collect()),
        }
    }

    async fn resolve_all(
        &self,
        resource_group: Option<&str>,
        report: &mut SweepReport,
    ) -> Result<Vec<GroupScope>> {
        let mut scopes = Vec::new();
        for sub in self.provider.list_subscriptions().await? {
            let id = sub.subscription_id.as_str();
            if self
                .policy
                .is_excluded_subscription(id, sub.display_name.as_deref())
            {
                tracing::info!(event = "sweep.scope.subscription_excluded", subscription = id);
                continue;
            }
            let resolved = match resource_group {
                Some(rg) => self
                    .provider
                    .resource_group_exists(id, rg)
                    .await
                    .map(|exists| {
                        if !exists {
                            tracing::debug!(
                                event = "sweep.scope.group_absent",
                                subscription = id,
                                resource_group = rg,
                            );
                        }
                        exists
                            .then(|| GroupScope::new(id, rg))
                            .into_iter()
                            .collect::<Vec<_>>()
                    }),
                None => self.provider.list_resource_groups(id).await.map(|groups| {
                    groups
                        .iter()
                        .map(|g| GroupScope::new(id, &g.name))
                        .collect()
                }),
            };
            match resolved {
                Ok(found) => scopes.extend(found),
                Err(e) => {
                    tracing::warn!(
                        event = "sweep.scope.resolve_failed",
                        subscription = id,
                        error = %e,
                    );
                    report.failed_groups.push(FailedScope {
                        subscription_id: id.to_string(),
                        resource_group: resource_group.map(str::to_owned),
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(scopes)
    }

    /// Sweeps one resource group. Never fails: errors end up in the report.
    pub async fn sweep_group(&self, scope: &GroupScope) -> GroupReport {
        tracing::info!(event = "sweep.group.started", scope = %scope);
        let mut report = GroupReport::new(scope);

        if let Some(found) = self.phase(scope, ResourceKind::VirtualMachine, &mut report).await {
            let candidates = self.select(found, true);
            self.process(candidates, 1, &mut report).await;
        }
        if let Some(found) = self.phase(scope, ResourceKind::ManagedDisk, &mut report).await {
            let candidates = self.select(found, false);
            self.process(candidates, self.concurrency, &mut report).await;
        }
        match enumerate::storage(self.provider.as_ref(), scope).await {
            Ok(found) => {
                record_skipped(&found, &mut report);
                let candidates = self.select_storage(found.resources);
                self.process(candidates, 1, &mut report).await;
            }
            Err(e) => phase_failed(scope, "storage", &e, &mut report),
        }
        if let Some(found) = self
            .phase(scope, ResourceKind::NetworkInterface, &mut report)
            .await
        {
            let candidates = self.select(found, true);
            self.process(candidates, self.concurrency, &mut report).await;
        }
        if let Some(found) = self
            .phase(scope, ResourceKind::PublicIpAddress, &mut report)
            .await
        {
            let candidates = self.select(found, false);
            self.process(candidates, self.concurrency, &mut report).await;
        }

        tracing::info!(
            event = "sweep.group.completed",
            scope = %scope,
            records = report.records.len(),
            errors = report.errors.len(),
        );
        report
    }

    async fn phase(
        &self,
        scope: &GroupScope,
        kind: ResourceKind,
        report: &mut GroupReport,
    ) -> Option<Vec<ManagedResource>> {
        match enumerate::enumerate(self.provider.as_ref(), scope, kind).await {
            Ok(found) => {
                record_skipped(&found, report);
                Some(found.resources)
            }
            Err(e) => {
                phase_failed(scope, &kind.to_string(), &e, report);
                None
            }
        }
    }

    fn is_protected(&self, resource: &ManagedResource) -> bool {
        let protected = self
            .policy
            .is_protected(resource.name(), resource.container());
        if protected {
            tracing::debug!(
                event = "sweep.resource.protected",
                kind = %resource.kind(),
                name = resource.name(),
            );
        }
        protected
    }

    /// Keeps the resources that are neither protected nor in use.
    fn select(&self, resources: Vec<ManagedResource>, cascade: bool) -> Vec<Candidate> {
        resources
            .into_iter()
            .filter(|r| !self.is_protected(r))
            .filter(|r| {
                let usage = classify(r);
                tracing::debug!(
                    event = "sweep.resource.classified",
                    kind = %r.kind(),
                    name = r.name(),
                    in_use = usage.in_use,
                    reason = %usage.reason,
                );
                !usage.in_use
            })
            .map(|resource| Candidate {
                resource,
                finding: Finding::Unused,
                cascade,
            })
            .collect()
    }

    /// Storage selection.
    ///
    /// - Wrong-usage containers are selected whatever they hold.
    /// - Unused boot diagnostics containers are selected as a whole.
    /// - Otherwise free VHD blobs are selected one by one (deleting the last
    ///   one removes the container), and empty containers as a whole.
    ///
    /// Blobs of a container selected as a whole are not selected again.
    fn select_storage(&self, resources: Vec<ManagedResource>) -> Vec<Candidate> {
        let mut whole: HashSet<(String, String)> = HashSet::new();
        let mut candidates = Vec::new();
        for resource in resources {
            let key = match &resource {
                ManagedResource::Container(c) => (c.account.name.clone(), c.name.clone()),
                ManagedResource::UnmanagedBlob(b) => (b.account.name.clone(), b.container.clone()),
                _ => continue,
            };
            if resource.kind() == ResourceKind::Blob {
                let selected = !whole.contains(&key)
                    && !self.is_protected(&resource)
                    && !classify(&resource).in_use;
                if selected {
                    candidates.push(Candidate {
                        resource,
                        finding: Finding::Unused,
                        cascade: true,
                    });
                }
                continue;
            }

            if self.is_protected(&resource) {
                whole.insert(key);
                continue;
            }
            let name = resource.name();
            let finding = if is_wrong_usage_container(name) {
                Finding::WrongUsage
            } else if !classify(&resource).in_use {
                Finding::Unused
            } else {
                continue;
            };
            if finding == Finding::WrongUsage || is_boot_diagnostics_container(name) {
                whole.insert(key);
            }
            candidates.push(Candidate {
                resource,
                finding,
                cascade: false,
            });
        }
        candidates
    }

    /// Reports candidates (dry run) or deletes them with at most `limit`
    /// deletions in flight (apply).
    async fn process(&self, candidates: Vec<Candidate>, limit: usize, report: &mut GroupReport) {
        if self.mode == SweepMode::DryRun {
            for c in &candidates {
                let record = SweepRecord::reported(&c.resource, c.finding);
                tracing::info!(event = "sweep.resource.found", line = %record.line());
                report.records.push(record);
            }
            return;
        }

        let outcomes: Vec<_> = stream::iter(candidates.iter())
            .map(|c| async move { (c, self.executor.delete(&c.resource, c.cascade).await) })
            .buffer_unordered(limit.max(1))
            .collect()
            .await;

        for (c, outcome) in outcomes {
            match outcome {
                Ok(deleted) => {
                    report
                        .records
                        .push(SweepRecord::deleted(&c.resource, c.finding));
                    report.records.extend(deleted.records);
                }
                Err(e) => {
                    report
                        .records
                        .push(SweepRecord::failed(&e, &c.resource, c.finding));
                }
            }
        }
    }
}

fn record_skipped(found: &Enumeration, report: &mut GroupReport) {
    report.errors.extend(
        found
            .skipped
            .iter()
            .map(|s| format!("{}: {}", s.resource, s.message)),
    );
}

fn phase_failed(scope: &GroupScope, phase: &str, error: &SweepError, report: &mut GroupReport) {
    tracing::warn!(
        event = "sweep.group.phase_failed",
        scope = %scope,
        phase,
        error = %error,
    );
    report
        .errors
        .push(format!("failed to list {phase} resources: {error}"));
}
