//! End-to-end crawl cycle over a snapshot file and the file-backed store.

use std::sync::Arc;

use chaos_core::{ChaosAction, Config, ScheduledActionRecord};
use chaos_crawler::{CrawlOrchestrator, SnapshotInventory};
use chaos_storage::{FileTableStore, TableStore};

const SNAPSHOT: &str = r#"{
  "resource_groups": [
    {
      "name": "rg-web",
      "machines": [
        { "id": "/subscriptions/s1/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/web-1",
          "power_state": "PowerState/running", "region": "westeurope" },
        { "id": "/subscriptions/s1/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/web-2",
          "power_state": "PowerState/stopped" },
        { "id": "/subscriptions/s1/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/web-lb",
          "power_state": "PowerState/running" }
      ],
      "load_balancers": [
        { "id": "lb-1", "backend_vm_ids": [
          "/subscriptions/s1/resourceGroups/rg-web/providers/Microsoft.Compute/virtualMachines/web-lb"
        ] }
      ]
    },
    {
      "name": "rg-db",
      "machines": [
        { "id": "/subscriptions/s1/resourceGroups/rg-db/providers/Microsoft.Compute/virtualMachines/db-1",
          "power_state": "PowerState/deallocated" }
      ]
    }
  ]
}"#;

fn setup() -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("inventory.json");
    std::fs::write(&snapshot, SNAPSHOT).unwrap();

    let mut config = Config::default();
    config.crawler.inventory_path = snapshot;
    config.storage.data_dir = dir.path().join("store");
    config.scheduler.rng_seed = Some(11);
    (dir, config)
}

#[tokio::test]
async fn snapshot_cycle_writes_schedule_to_disk() {
    let (_dir, config) = setup();
    let store = Arc::new(FileTableStore::new(&config.storage.data_dir).unwrap());
    let inventory = Arc::new(SnapshotInventory::new(&config.crawler.inventory_path));
    let orchestrator = CrawlOrchestrator::new(config.clone(), inventory, store).unwrap();

    let report = orchestrator.run_cycle().await;
    assert!(!report.has_failures(), "unexpected failures: {:?}", report.failures);
    assert_eq!(report.groups.len(), 2);
    assert_eq!(report.total_scheduled(), 2);
    assert_eq!(report.group("rg-web").unwrap().excluded, 1);

    // Reopen to read what actually hit the disk.
    let reopened = FileTableStore::new(&config.storage.data_dir).unwrap();
    let mut records: Vec<ScheduledActionRecord> = reopened
        .query_partition(&config.storage.schedule_table, "rg-web")
        .await
        .unwrap()
        .iter()
        .map(|row| row.decode().unwrap())
        .collect();
    records.sort_by(|a, b| a.resource_name.cmp(&b.resource_name));

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].resource_name, "web-1");
    assert_eq!(records[0].action, ChaosAction::PowerOff);
    assert_eq!(records[1].action, ChaosAction::Start);
    assert_eq!(records[0].session_id, records[1].session_id);

    let machines = reopened
        .query_table(&config.storage.virtual_machine_table)
        .await
        .unwrap();
    assert_eq!(machines.len(), 3);
}

#[tokio::test]
async fn missing_snapshot_fails_every_group_without_panicking() {
    let (dir, mut config) = setup();
    config.crawler.resource_groups = vec!["rg-web".into()];
    let store = Arc::new(FileTableStore::new(&config.storage.data_dir).unwrap());
    let inventory = Arc::new(SnapshotInventory::new(dir.path().join("missing.json")));
    let orchestrator = CrawlOrchestrator::new(config.clone(), inventory, store.clone()).unwrap();

    let report = orchestrator.run_cycle().await;
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.total_scheduled(), 0);
    assert_eq!(
        store.query_table(&config.storage.error_table).await.unwrap().len(),
        1
    );
}
