//! Async library for finding and deleting orphaned Azure resources.
//!
//! Appliance test deployments leave VMs, NICs, public IPs, managed disks,
//! VHD blobs and storage containers behind. This crate enumerates them per
//! resource group, classifies each as in use or not, applies a whitelist
//! policy, and either reports or deletes what is left, cascading from a VM
//! into the resources that only existed for it.
//!
//! # Modules
//!
//! - [`auth`] — OAuth2 client credentials token provider (global and China clouds).
//! - [`client`] — Authenticated ARM client with 401 retry and `nextLink` paging.
//! - [`operation`] — Long-running operation tracking (`Azure-AsyncOperation`, `Location`).
//! - [`storage`] — Blob service client signed with Shared Key.
//! - [`models`] — ARM payloads and resource id parsing.
//! - [`provider`] — The `CloudProvider` seam and its Azure binding.
//! - [`resources`] — Domain model of the sweep.
//! - [`enumerate`] — Per-group, per-kind enumeration.
//! - [`classify`] — Usage classification.
//! - [`policy`] — Whitelist policy.
//! - [`delete`] — Deletion executor with cascades.
//! - [`report`] — Structured sweep results.
//! - [`sweep`] — The orchestrator.
//! - [`inventory`] — Read-only listings (VM addresses, NIC attachment, leases).
//! - [`vm`] — Operator VM actions (power, resize, data disks).
//! - [`error`] — Typed error hierarchy (`SweepError`).
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use az_sweep::auth::{Cloud, TokenProvider};
//! use az_sweep::client::ArmClient;
//! use az_sweep::policy::PolicyConfig;
//! use az_sweep::provider::AzureProvider;
//! use az_sweep::sweep::{SweepMode, Sweeper};
//!
//! let tp = TokenProvider::new(Cloud::Public, "tenant", "client_id", "secret");
//! let arm = ArmClient::new(Cloud::Public, tp)?;
//! let provider = Arc::new(AzureProvider::new(arm, Cloud::Public.blob_endpoint_template()));
//! let report = Sweeper::new(provider, PolicyConfig::default(), SweepMode::DryRun)
//!     .run(Some("subscription-id"), Some("ddve-dev-rg"))
//!     .await?;
//! for line in report.lines() {
//!     println!("{line}");
//! }
//! ```

pub mod auth;
pub mod classify;
pub mod client;
pub mod delete;
pub mod enumerate;
pub mod error;
pub mod inventory;
pub mod models;
pub mod operation;
pub mod policy;
pub mod provider;
pub mod report;
pub mod resources;
pub mod storage;
pub mod sweep;
pub mod vm;
