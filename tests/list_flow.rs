//! Operator listing tests against the in-memory cloud.

mod common;

use az_sweep::error::SweepError;
use az_sweep::inventory::{self, Row};
use common::{FakeCloud, SUB};

fn lines(rows: &[Row]) -> Vec<String> {
    rows.iter().map(Row::line).collect()
}

#[tokio::test]
async fn vms_show_power_state_and_addresses() {
    let fake = FakeCloud::new();
    let rg = fake.add_group(SUB, "rg");
    fake.add_vm(&rg, "vm1", true, &["vm1-nic"], None);
    fake.add_nic(&rg, "vm1-nic", Some("vm1"), &["vm1-pip"]);
    fake.add_public_ip(&rg, "vm1-pip", Some("20.1.2.3"));
    fake.add_vm(&rg, "vm2", false, &[], None);

    let rows = inventory::virtual_machines(&fake, &rg).await.unwrap();

    assert_eq!(
        lines(&rows),
        vec![
            "vm1: VM running; public 20.1.2.3; private 10.0.0.4",
            "vm2: VM stopped; public none; private none",
        ]
    );
    match &rows[0] {
        Row::VirtualMachine { public_ips, .. } => assert_eq!(public_ips, &vec!["20.1.2.3".to_string()]),
        other => panic!("expected a VM row, got {other:?}"),
    }
}

#[tokio::test]
async fn public_ip_without_address_is_left_out() {
    let fake = FakeCloud::new();
    let rg = fake.add_group(SUB, "rg");
    fake.add_vm(&rg, "vm1", true, &["vm1-nic"], None);
    fake.add_nic(&rg, "vm1-nic", Some("vm1"), &["vm1-pip"]);
    fake.add_public_ip(&rg, "vm1-pip", None);

    let rows = inventory::virtual_machines(&fake, &rg).await.unwrap();

    assert_eq!(lines(&rows), vec!["vm1: VM running; public none; private 10.0.0.4"]);
}

#[tokio::test]
async fn nics_are_available_or_attached() {
    let fake = FakeCloud::new();
    let rg = fake.add_group(SUB, "rg");
    fake.add_vm(&rg, "vm1", true, &["vm1-nic"], None);
    fake.add_nic(&rg, "vm1-nic", Some("vm1"), &[]);
    fake.add_nic(&rg, "nic-orphan", None, &[]);

    let rows = inventory::network_interfaces(&fake, &rg).await.unwrap();

    assert_eq!(
        lines(&rows),
        vec!["vm1-nic: attached to vm1", "nic-orphan: Available"]
    );
}

#[tokio::test]
async fn vhds_show_leases_and_skip_other_blobs() {
    let fake = FakeCloud::new();
    let rg = fake.add_group(SUB, "rg");
    let sa = fake.add_account(&rg, "ddvestg");
    fake.add_blob(&sa, "vhds", "live.vhd", true);
    fake.add_blob(&sa, "vhds", "old.vhd", false);
    fake.add_block_blob(&sa, "backups", "db-dump.sql.gz");

    let rows = inventory::vhds(&fake, &rg, None, None).await.unwrap();

    assert_eq!(
        lines(&rows),
        vec![
            "ddvestg/vhds/live.vhd: locked/leased",
            "ddvestg/vhds/old.vhd: unlocked/available",
        ]
    );

    let narrowed = inventory::vhds(&fake, &rg, Some("ddvestg"), Some("backups"))
        .await
        .unwrap();
    assert!(narrowed.is_empty());
}

#[tokio::test]
async fn containers_of_a_named_account() {
    let fake = FakeCloud::new();
    let rg = fake.add_group(SUB, "rg");
    let sa = fake.add_account(&rg, "ddvestg");
    let other = fake.add_account(&rg, "otherstg");
    fake.add_container(&sa, "vhds");
    fake.add_container(&sa, "templates");
    fake.add_container(&other, "logs");

    let rows = inventory::containers(&fake, &rg, Some("ddvestg")).await.unwrap();

    assert_eq!(
        lines(&rows),
        vec![
            "ddvestg/templates: unlocked/available",
            "ddvestg/vhds: unlocked/available",
        ]
    );

    let err = inventory::containers(&fake, &rg, Some("nosuchstg"))
        .await
        .unwrap_err();
    assert!(matches!(err, SweepError::ScopeNotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn groups_and_storage_accounts_across_the_subscription() {
    let fake = FakeCloud::new();
    let dev = fake.add_group(SUB, "dev-rg");
    let qa = fake.add_group(SUB, "qa-rg");
    fake.add_account(&dev, "devstg");
    fake.add_account(&qa, "qastg");

    let groups = inventory::resource_groups(&fake, SUB).await.unwrap();
    assert_eq!(lines(&groups), vec!["dev-rg (westus)", "qa-rg (westus)"]);

    let all = inventory::storage_accounts(&fake, SUB, None).await.unwrap();
    assert_eq!(lines(&all), vec!["dev-rg/devstg", "qa-rg/qastg"]);

    let one = inventory::storage_accounts(&fake, SUB, Some(&qa)).await.unwrap();
    assert_eq!(lines(&one), vec!["qa-rg/qastg"]);
}

#[tokio::test]
async fn unknown_group_is_scope_not_found() {
    let fake = FakeCloud::new();
    fake.add_group(SUB, "rg");

    let err = inventory::group(&fake, SUB, "missing-rg").await.unwrap_err();
    assert!(matches!(err, SweepError::ScopeNotFound { .. }), "got {err:?}");
    assert_eq!(
        inventory::group(&fake, SUB, "rg").await.unwrap().resource_group,
        "rg"
    );
}
