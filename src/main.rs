//! CLI entry point for az-sweep.
//!
//! Authenticates with a service principal, then sweeps a scope for orphaned
//! resources (`sweep`), lists what a scope holds (`list`) or runs a single VM
//! operation (`vm`).
//!
//! Exit codes:
//! - 0: success (a sweep succeeds even when individual deletions failed;
//!   those are in the report)
//! - 1: fatal error (missing credentials, unknown scope, auth failure, ...)
//! - 2: argument validation error (clap handles this automatically)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use az_sweep::auth::{Cloud, TokenProvider};
use az_sweep::client::ArmClient;
use az_sweep::error::{Result, SweepError};
use az_sweep::inventory;
use az_sweep::policy::PolicyConfig;
use az_sweep::provider::AzureProvider;
use az_sweep::resources::GroupScope;
use az_sweep::sweep::{SweepMode, Sweeper};
use az_sweep::vm;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Azure AD tenant ID of the service principal.
    #[arg(long, env = "AZURE_TENANT_ID", global = true)]
    tenant_id: Option<String>,

    /// Application (client) ID of the service principal.
    #[arg(long, env = "AZURE_CLIENT_ID", global = true)]
    client_id: Option<String>,

    /// Client secret. Prefer the AZURE_CLIENT_SECRET environment variable
    /// to keep the secret out of process listings and shell history.
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true, global = true)]
    secret: Option<String>,

    /// Target Azure China instead of global Azure.
    #[arg(long, global = true)]
    china: bool,

    /// TOML file with the whitelist policy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report (and with --delete, remove) orphaned resources.
    Sweep(SweepArgs),
    /// List resources and their state.
    List(ListArgs),
    /// Operate on a single VM.
    Vm(VmArgs),
}

#[derive(clap::Args)]
struct SweepArgs {
    /// Subscription to sweep. Every subscription when omitted.
    #[arg(long, short = 's')]
    subscription: Option<String>,

    /// Resource group to sweep. Every group when omitted.
    #[arg(long, short = 'r')]
    resource_group: Option<String>,

    /// Delete orphans. Without this flag the sweep only reports them.
    #[arg(long)]
    delete: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Maximum parallel deletions of disks, NICs and public IPs.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,
}

#[derive(clap::Args)]
struct ListArgs {
    #[arg(long, short = 's')]
    subscription: String,

    /// Print rows as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    what: ListKind,
}

#[derive(Subcommand)]
enum ListKind {
    ResourceGroups,
    StorageAccounts {
        /// Every group when omitted.
        #[arg(long, short = 'r')]
        resource_group: Option<String>,
    },
    /// VMs with power state and IP addresses.
    Vms {
        #[arg(long, short = 'r')]
        resource_group: String,
    },
    /// NICs, free or attached.
    Nics {
        #[arg(long, short = 'r')]
        resource_group: String,
    },
    /// Containers with their lease.
    Containers {
        #[arg(long, short = 'r')]
        resource_group: String,
        #[arg(long)]
        storage_account: Option<String>,
    },
    /// VHD blobs with their lease.
    Vhds {
        #[arg(long, short = 'r')]
        resource_group: String,
        #[arg(long)]
        storage_account: Option<String>,
        #[arg(long, short = 'c')]
        container: Option<String>,
    },
}

#[derive(clap::Args)]
struct VmArgs {
    #[arg(long, short = 's')]
    subscription: String,

    #[arg(long, short = 'r')]
    resource_group: String,

    /// VM name.
    #[arg(long, short = 'n')]
    name: String,

    #[command(subcommand)]
    action: VmAction,
}

#[derive(Subcommand)]
enum VmAction {
    Start,
    PowerOff,
    Deallocate,
    Restart,
    /// Print the current power state.
    Status,
    Resize {
        /// Target size, e.g. Standard_F8s.
        #[arg(long)]
        size: String,
    },
    /// List data disks (NVRAM disks excluded).
    Disks,
    AttachDisk {
        #[arg(long)]
        disk_name: String,
        /// Size in GiB, clamped to 1..=1023.
        #[arg(long, default_value_t = 1023)]
        size_gb: u32,
        /// Storage account holding the `vhds` container.
        #[arg(long)]
        storage_account: String,
        /// Attach an existing VHD instead of creating an empty disk.
        #[arg(long)]
        existing: bool,
    },
    DetachDisk {
        #[arg(long)]
        disk_name: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "az_sweep=debug"
    } else {
        "az_sweep=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Logs go to stderr so `--json` output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn required<'a>(value: &'a Option<String>, flag: &str, env: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SweepError::Misconfiguration(format!("missing {flag} (or {env})")))
}

fn token_provider(cli: &Cli, cloud: Cloud) -> Result<TokenProvider> {
    Ok(TokenProvider::new(
        cloud,
        required(&cli.tenant_id, "--tenant-id", "AZURE_TENANT_ID")?,
        required(&cli.client_id, "--client-id", "AZURE_CLIENT_ID")?,
        required(&cli.secret, "--secret", "AZURE_CLIENT_SECRET")?,
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let cloud = if cli.china { Cloud::China } else { Cloud::Public };
    // Credentials and policy are checked before any network call.
    let auth = token_provider(&cli, cloud)?;
    let policy = match &cli.config {
        Some(path) => PolicyConfig::load(path)?,
        None => PolicyConfig::default(),
    };
    let arm = ArmClient::new(cloud, auth)?;

    match cli.command {
        Command::Sweep(args) => {
            let provider = Arc::new(AzureProvider::new(arm, cloud.blob_endpoint_template()));
            let mode = if args.delete {
                SweepMode::Apply
            } else {
                SweepMode::DryRun
            };
            let report = Sweeper::new(provider, policy, mode)
                .with_concurrency(usize::from(args.concurrency))
                .run(args.subscription.as_deref(), args.resource_group.as_deref())
                .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for line in report.lines() {
                    println!("{line}");
                }
                println!(
                    "{} groups swept: {} reported, {} deleted, {} failed, {} protected.",
                    report.groups.len(),
                    report.reported_count(),
                    report.deleted_count(),
                    report.failed_count(),
                    report.protected_count()
                );
            }
        }
        Command::List(args) => {
            let provider = AzureProvider::new(arm, cloud.blob_endpoint_template());
            let rows = list(&provider, &args.subscription, args.what).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in &rows {
                    println!("{}", row.line());
                }
            }
        }
        Command::Vm(args) => {
            let scope = GroupScope::new(&args.subscription, &args.resource_group);
            let name = args.name.as_str();
            match args.action {
                VmAction::Start => vm::start(&arm, &scope, name).await?,
                VmAction::PowerOff => vm::power_off(&arm, &scope, name).await?,
                VmAction::Deallocate => vm::deallocate(&arm, &scope, name).await?,
                VmAction::Restart => vm::restart(&arm, &scope, name).await?,
                VmAction::Status => {
                    let state = vm::power_state(&arm, &scope, name).await?;
                    println!("{name}: {}", state.as_deref().unwrap_or("unknown"));
                }
                VmAction::Resize { size } => vm::resize(&arm, &scope, name, &size).await?,
                VmAction::Disks => {
                    for disk in vm::list_data_disks(&arm, &scope, name).await? {
                        println!(
                            "LUN {}: {} ({} GiB) {}",
                            disk.lun,
                            disk.name.as_deref().unwrap_or("-"),
                            disk.disk_size_gb
                                .map_or_else(|| "?".to_string(), |s| s.to_string()),
                            disk.vhd.map(|v| v.uri).unwrap_or_default()
                        );
                    }
                }
                VmAction::AttachDisk {
                    disk_name,
                    size_gb,
                    storage_account,
                    existing,
                } => {
                    let request = vm::AttachDisk {
                        disk_name,
                        size_gb,
                        storage_account,
                        existing,
                    };
                    let lun = vm::attach_data_disk(
                        &arm,
                        &scope,
                        name,
                        &request,
                        cloud.blob_endpoint_template(),
                    )
                    .await?;
                    println!("Attached {} at LUN {lun}", request.disk_name);
                }
                VmAction::DetachDisk { disk_name } => {
                    vm::detach_data_disk(&arm, &scope, name, &disk_name).await?
                }
            }
        }
    }
    Ok(())
}

async fn list(
    provider: &AzureProvider,
    subscription: &str,
    what: ListKind,
) -> Result<Vec<inventory::Row>> {
    match what {
        ListKind::ResourceGroups => inventory::resource_groups(provider, subscription).await,
        ListKind::StorageAccounts { resource_group } => {
            let scope = match resource_group {
                Some(rg) => Some(inventory::group(provider, subscription, &rg).await?),
                None => None,
            };
            inventory::storage_accounts(provider, subscription, scope.as_ref()).await
        }
        ListKind::Vms { resource_group } => {
            let scope = inventory::group(provider, subscription, &resource_group).await?;
            inventory::virtual_machines(provider, &scope).await
        }
        ListKind::Nics { resource_group } => {
            let scope = inventory::group(provider, subscription, &resource_group).await?;
            inventory::network_interfaces(provider, &scope).await
        }
        ListKind::Containers {
            resource_group,
            storage_account,
        } => {
            let scope = inventory::group(provider, subscription, &resource_group).await?;
            inventory::containers(provider, &scope, storage_account.as_deref()).await
        }
        ListKind::Vhds {
            resource_group,
            storage_account,
            container,
        } => {
            let scope = inventory::group(provider, subscription, &resource_group).await?;
            inventory::vhds(
                provider,
                &scope,
                storage_account.as_deref(),
                container.as_deref(),
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
