//! Crawl cycle orchestration.
//!
//! One cycle resolves the resource groups to crawl, crawls them with bounded
//! concurrency, and writes three things per group: crawled machine state,
//! crawled scale-set state, and the chaos schedule. A failing group or
//! partition is reported and skipped; it never aborts the rest of the cycle.


use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chaos_core::keys::row_key;
use chaos_core::{Config, MachineRecord, ScheduleVariant, ScheduledActionRecord, VmGroup};
use chaos_rules::{assemble, group_by_partition, ActionRules, ScheduleBuilder};
use chaos_storage::{TableRow, TableStore};

use crate::entities::{CrawlErrorRecord, ScaleSetCrawlEntity};
use crate::error::{CrawlError, InventoryError};
use crate::inventory::ResourceInventory;
use crate::report::{CrawlFailure, CycleReport, FailureStage, GroupReport, SessionSummary};

pub struct CrawlOrchestrator {
    config: Config,
    inventory: Arc<dyn ResourceInventory>,
    store: Arc<dyn TableStore>,
    builder: ScheduleBuilder,
    /// Cycles started by this orchestrator; mixed into seeded RNGs.
    cycles: AtomicU64,
}

impl CrawlOrchestrator {
    /// Validate `config` and set up the schedule builder.
    pub fn new(
        config: Config,
        inventory: Arc<dyn ResourceInventory>,
        store: Arc<dyn TableStore>,
    ) -> Result<Self, CrawlError> {
        config.validate()?;
        let rules = ActionRules::from_config(&config.scheduler)?;
        let builder = ScheduleBuilder::new(config.scheduler.frequency_minutes)?.with_rules(rules);
        debug!(
            window_minutes = builder.window_minutes(),
            actionable = ?builder.rules().actionable_states(),
            "schedule builder ready"
        );
        Ok(Self {
            config,
            inventory,
            store,
            builder,
            cycles: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Effective batch size: the configured size capped by the store's limit.
    pub fn batch_limit(&self) -> usize {
        self.config
            .storage
            .max_batch_size
            .min(self.store.max_batch_size())
            .max(1)
    }

    // ── Cycle ───────────────────────────────────────────────────────

    /// Run one full crawl cycle. Never fails as a whole: every problem ends
    /// up in the returned report.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed);
        let started_at = Utc::now();
        info!(%cycle_id, cycle, store = self.store.name(), "crawl cycle started");

        let mut report = CycleReport {
            cycle_id,
            started_at,
            finished_at: started_at,
            groups: Vec::new(),
            failures: Vec::new(),
            timed_out: false,
        };

        let groups = match self.resolve_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(%cycle_id, error = %e, "could not resolve resource groups");
                report
                    .failures
                    .push(CrawlFailure::new("*", FailureStage::ResolveGroups, e.to_string()));
                return self.finish(report).await;
            }
        };
        debug!(%cycle_id, groups = groups.len(), "resource groups resolved");

        let mut finished: Vec<GroupReport> = Vec::with_capacity(groups.len());
        let crawl = async {
            let mut reports = stream::iter(groups.iter().cloned())
                .map(|rg| self.crawl_group(rg, cycle))
                .buffer_unordered(self.config.crawler.worker_limit);
            while let Some(group) = reports.next().await {
                finished.push(group);
            }
        };
        let cycle_timeout = self.config.crawler.cycle_timeout();
        if tokio::time::timeout(cycle_timeout, crawl).await.is_err() {
            report.timed_out = true;
            let done: HashSet<&str> = finished.iter().map(|g| g.resource_group.as_str()).collect();
            for rg in groups.iter().filter(|rg| !done.contains(rg.as_str())) {
                warn!(%cycle_id, resource_group = %rg, "group abandoned at cycle timeout");
                report.failures.push(CrawlFailure::new(
                    rg.as_str(),
                    FailureStage::CycleTimeout,
                    format!("cycle timed out after {cycle_timeout:?}"),
                ));
            }
        }

        finished.sort_by(|a, b| a.resource_group.cmp(&b.resource_group));
        report.groups = finished;
        self.finish(report).await
    }

    async fn finish(&self, mut report: CycleReport) -> CycleReport {
        self.persist_failures(&report).await;
        report.finished_at = Utc::now();
        info!(
            cycle_id = %report.cycle_id,
            groups = report.groups.len(),
            scheduled = report.total_scheduled(),
            failures = report.failure_count(),
            timed_out = report.timed_out,
            "crawl cycle finished"
        );
        report
    }

    /// Groups to crawl: the configured list, or everything the inventory
    /// reports. Deduplicated case-insensitively, exclusions removed.
    pub async fn resolve_groups(&self) -> Result<Vec<String>, CrawlError> {
        let crawler = &self.config.crawler;
        let candidates = if crawler.resource_groups.is_empty() {
            self.bounded("*", "list_resource_groups", self.inventory.list_resource_groups())
                .await?
        } else {
            crawler.resource_groups.clone()
        };

        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .map(|rg| rg.trim().to_string())
            .filter(|rg| !rg.is_empty())
            .filter(|rg| seen.insert(rg.to_ascii_lowercase()))
            .filter(|rg| {
                let excluded = crawler.is_excluded(rg);
                if excluded {
                    debug!(resource_group = %rg, "resource group excluded");
                }
                !excluded
            })
            .collect())
    }

    // ── Group ───────────────────────────────────────────────────────

    /// Crawl, persist, and schedule one resource group. `cycle` is this
    /// orchestrator's cycle counter.
    async fn crawl_group(&self, resource_group: String, cycle: u64) -> GroupReport {
        let mut report = GroupReport::new(&resource_group);
        let crawler = &self.config.crawler;
        let rg = resource_group.as_str();

        let enumerated = async {
            let machines = if crawler.crawl_virtual_machines || crawler.crawl_availability_sets {
                self.bounded(rg, "list_machines", self.inventory.list_machines(rg)).await?
            } else {
                Vec::new()
            };
            let scale_sets = if crawler.crawl_scale_sets {
                self.bounded(rg, "list_scale_sets", self.inventory.list_scale_sets(rg)).await?
            } else {
                Vec::new()
            };
            let lb_backed = self
                .bounded(rg, "list_load_balancer_backed_ids", self.inventory.list_load_balancer_backed_ids(rg))
                .await?;
            Ok::<_, CrawlError>((machines, scale_sets, lb_backed))
        };
        let (machines, mut scale_sets, lb_backed) = match enumerated.await {
            Ok(parts) => parts,
            Err(e) => {
                warn!(resource_group = %rg, error = %e, "enumeration failed, skipping group");
                report
                    .failures
                    .push(CrawlFailure::new(rg, FailureStage::Enumerate, e.to_string()));
                return report;
            }
        };

        let lb_backed: HashSet<String> = lb_backed.iter().map(|id| id.to_ascii_lowercase()).collect();
        let behind_lb = |m: &MachineRecord| lb_backed.contains(&m.resource_id.to_ascii_lowercase());

        let mut kept: Vec<MachineRecord> = Vec::new();
        for machine in machines {
            report.machines_seen += 1;
            if let Err(e) = machine.validate() {
                debug!(resource_group = %rg, error = %e, "dropping malformed machine record");
                report.malformed += 1;
                continue;
            }
            let wanted = match machine.group {
                VmGroup::Standalone => crawler.crawl_virtual_machines,
                VmGroup::AvailabilitySetMember => crawler.crawl_availability_sets,
                VmGroup::ScaleSetMember => crawler.crawl_scale_sets,
            };
            if !wanted {
                continue;
            }
            if behind_lb(&machine) {
                report.excluded += 1;
                continue;
            }
            kept.push(machine);
        }
        for set in &mut scale_sets {
            report.machines_seen += set.instances.len();
            let before = set.instances.len();
            set.instances.retain(|m| match m.validate() {
                Ok(()) => true,
                Err(e) => {
                    debug!(resource_group = %rg, error = %e, "dropping malformed scale-set instance");
                    false
                }
            });
            report.malformed += before - set.instances.len();
            let valid = set.instances.len();
            set.instances.retain(|m| !behind_lb(m));
            report.excluded += valid - set.instances.len();
            kept.extend(set.instances.iter().cloned());
        }
        if report.excluded > 0 {
            debug!(resource_group = %rg, excluded = report.excluded, "load-balancer-backed machines excluded");
        }

        self.persist_machines(&mut report, &kept).await;
        self.persist_scale_sets(&mut report, &scale_sets).await;

        let records = self.schedule(&mut report, &kept, cycle);
        self.persist_schedule(&mut report, records).await;

        info!(
            resource_group = %rg,
            machines = report.machines_seen,
            excluded = report.excluded,
            malformed = report.malformed,
            scheduled = report.scheduled,
            failures = report.failures.len(),
            "resource group crawled"
        );
        report
    }

    /// Build one schedule per non-empty group category.
    fn schedule(&self, report: &mut GroupReport, machines: &[MachineRecord], cycle: u64) -> Vec<ScheduledActionRecord> {
        let zonal = if self.config.scheduler.zone_scheduling {
            ScheduleVariant::AvailabilityZone
        } else {
            ScheduleVariant::Standard
        };
        let categories = [
            (VmGroup::Standalone, zonal),
            (VmGroup::ScaleSetMember, zonal),
            (
                VmGroup::AvailabilitySetMember,
                ScheduleVariant::AvailabilitySet {
                    domain_flag: self.config.scheduler.fault_domain,
                },
            ),
        ];

        let mut rng = self.group_rng(&report.resource_group, cycle);
        let mut records = Vec::new();
        for (group, variant) in categories {
            let members: Vec<MachineRecord> = machines.iter().filter(|m| m.group == group).cloned().collect();
            if members.is_empty() {
                continue;
            }
            let schedule = self.builder.build_with(&members, variant, &mut rng, Utc::now());
            debug!(
                resource_group = %report.resource_group,
                session_id = %schedule.session_id,
                %variant,
                scheduled = schedule.len(),
                skipped = schedule.skipped,
                "schedule built"
            );
            report.sessions.push(SessionSummary {
                session_id: schedule.session_id,
                variant,
                execution_time: schedule.execution_time,
                scheduled: schedule.len(),
                skipped: schedule.skipped,
            });
            records.extend(schedule.records);
        }
        records
    }

    /// Seeded per group and cycle: reproducible regardless of completion
    /// order, yet every cycle gets fresh sessions and execution times.
    fn group_rng(&self, resource_group: &str, cycle: u64) -> StdRng {
        match self.config.scheduler.rng_seed {
            Some(seed) => {
                let mixed = resource_group
                    .to_ascii_lowercase()
                    .bytes()
                    .chain(cycle.to_le_bytes())
                    .fold(seed ^ 0xcbf2_9ce4_8422_2325, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
                StdRng::seed_from_u64(mixed)
            }
            None => StdRng::from_entropy(),
        }
    }

    // ── Persistence ─────────────────────────────────────────────────

    async fn persist_machines(&self, report: &mut GroupReport, machines: &[MachineRecord]) {
        let table = self.config.storage.virtual_machine_table.clone();
        let keyed = machines
            .iter()
            .filter_map(|m| m.partition_key().ok().map(|pk| (pk, m)));
        for (pk, members) in group_by_partition(keyed, |(pk, _)| pk.clone()) {
            let rows: Result<Vec<TableRow>, _> = members
                .iter()
                .map(|(_, m)| TableRow::from_entity(pk.as_str(), row_key(&m.resource_id), *m))
                .collect();
            self.write_rows(report, FailureStage::PersistCrawl, &table, &pk, members.len(), rows)
                .await;
        }
    }

    async fn persist_scale_sets(&self, report: &mut GroupReport, scale_sets: &[chaos_core::ScaleSetRecord]) {
        let table = self.config.storage.scale_set_table.clone();
        let entities: Vec<ScaleSetCrawlEntity> = scale_sets.iter().map(ScaleSetCrawlEntity::from).collect();
        for (pk, members) in group_by_partition(entities, ScaleSetCrawlEntity::partition_key) {
            let rows: Result<Vec<TableRow>, _> = members
                .iter()
                .map(|e| TableRow::from_entity(pk.as_str(), e.row_key(), e))
                .collect();
            self.write_rows(report, FailureStage::PersistCrawl, &table, &pk, members.len(), rows)
                .await;
        }
    }

    async fn persist_schedule(&self, report: &mut GroupReport, records: Vec<ScheduledActionRecord>) {
        let table = self.config.storage.schedule_table.clone();
        for (pk, members) in assemble(records) {
            let rows: Result<Vec<TableRow>, _> = members
                .iter()
                .map(|r| TableRow::from_entity(pk.as_str(), r.row_key(), r))
                .collect();
            let written = self
                .write_rows(report, FailureStage::PersistSchedule, &table, &pk, members.len(), rows)
                .await;
            report.scheduled += written;
        }
    }

    /// Write one partition in chunks of [`Self::batch_limit`]. Returns the
    /// number of rows committed; a failure is recorded with the rows it lost.
    async fn write_rows(
        &self,
        report: &mut GroupReport,
        stage: FailureStage,
        table: &str,
        partition_key: &str,
        record_count: usize,
        rows: Result<Vec<TableRow>, chaos_storage::StoreError>,
    ) -> usize {
        let resource_group = report.resource_group.clone();
        let fail = |report: &mut GroupReport, err: CrawlError, lost: usize| {
            warn!(%resource_group, %table, %partition_key, lost, error = %err, "partition write failed");
            report
                .failures
                .push(CrawlFailure::new(resource_group.as_str(), stage, err.to_string()).for_partition(partition_key, lost));
        };

        let rows = match rows {
            Ok(rows) => rows,
            Err(source) => {
                let err = self.persistence_error(&report.resource_group, table, partition_key, record_count, source);
                fail(report, err, record_count);
                return 0;
            }
        };

        let mut written = 0;
        for chunk in rows.chunks(self.batch_limit()) {
            let call = self.store.upsert_batch(table, partition_key, chunk.to_vec());
            let result = match tokio::time::timeout(self.config.crawler.call_timeout(), call).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(self.persistence_error(&report.resource_group, table, partition_key, chunk.len(), source)),
                Err(_) => Err(CrawlError::Timeout {
                    resource_group: report.resource_group.clone(),
                    operation: format!("upsert {table}/{partition_key}"),
                    after: self.config.crawler.call_timeout(),
                }),
            };
            match result {
                Ok(()) => {
                    written += chunk.len();
                    report.batches_written += 1;
                }
                Err(err) => {
                    fail(report, err, rows.len() - written);
                    break;
                }
            }
        }
        written
    }

    fn persistence_error(
        &self,
        resource_group: &str,
        table: &str,
        partition_key: &str,
        record_count: usize,
        source: chaos_storage::StoreError,
    ) -> CrawlError {
        CrawlError::Persistence {
            resource_group: resource_group.to_string(),
            table: table.to_string(),
            partition_key: partition_key.to_string(),
            record_count,
            source,
        }
    }

    /// Best effort: failures to record failures are only logged.
    async fn persist_failures(&self, report: &CycleReport) {
        if !report.has_failures() {
            return;
        }
        let now = Utc::now();
        let table = &self.config.storage.error_table;
        let records: Vec<CrawlErrorRecord> = report
            .all_failures()
            .map(|f| CrawlErrorRecord::from_failure(report.cycle_id, f, now))
            .collect();
        let pk = report.cycle_id.to_string();

        for chunk in records.chunks(self.batch_limit()) {
            let rows: Result<Vec<TableRow>, _> = chunk
                .iter()
                .map(|r| TableRow::from_entity(r.partition_key(), Uuid::new_v4().to_string(), r))
                .collect();
            let rows = match rows {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(cycle_id = %report.cycle_id, %table, error = %e, "could not encode crawl errors");
                    return;
                }
            };
            let after = self.config.crawler.call_timeout();
            match tokio::time::timeout(after, self.store.upsert_batch(table, &pk, rows)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(cycle_id = %report.cycle_id, %table, error = %e, "could not record crawl errors");
                    return;
                }
                Err(_) => {
                    warn!(cycle_id = %report.cycle_id, %table, ?after, "recording crawl errors timed out");
                    return;
                }
            }
        }
    }

    // ── Inventory calls ─────────────────────────────────────────────

    /// Bound an inventory call by the per-call timeout.
    async fn bounded<T, F>(&self, resource_group: &str, operation: &str, call: F) -> Result<T, CrawlError>
    where
        F: Future<Output = Result<T, InventoryError>>,
    {
        let after = self.config.crawler.call_timeout();
        match tokio::time::timeout(after, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(CrawlError::Enumeration {
                resource_group: resource_group.to_string(),
                source,
            }),
            Err(_) => Err(CrawlError::Timeout {
                resource_group: resource_group.to_string(),
                operation: operation.to_string(),
                after,
            }),
        }
    }
}
