//! [`ScheduleBuilder`]: machines in, one session of scheduled actions out.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use chaos_core::{ChaosAction, ChaosError, MachineRecord, ScheduleVariant, ScheduledActionRecord};

use crate::classifier::ActionRules;

/// Output of one builder invocation.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub session_id: Uuid,
    pub execution_time: DateTime<Utc>,
    pub variant: ScheduleVariant,
    pub records: Vec<ScheduledActionRecord>,
    /// Inputs dropped as malformed or not actionable.
    pub skipped: usize,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Builds schedules over a fixed execution window.
#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    window_minutes: u32,
    rules: ActionRules,
}

impl ScheduleBuilder {
    /// Create a builder. Fails with `InvalidConfiguration` when the window is
    /// shorter than one minute.
    pub fn new(window_minutes: u32) -> Result<Self, ChaosError> {
        if window_minutes < 1 {
            return Err(ChaosError::InvalidConfiguration(format!(
                "scheduling window must be at least 1 minute, got {window_minutes}"
            )));
        }
        Ok(Self {
            window_minutes,
            rules: ActionRules::default(),
        })
    }

    /// Use a custom state → action table.
    pub fn with_rules(mut self, rules: ActionRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }

    pub fn rules(&self) -> &ActionRules {
        &self.rules
    }

    /// Build against the wall clock and the thread-local RNG.
    pub fn build(&self, records: &[MachineRecord], variant: ScheduleVariant) -> Schedule {
        self.build_with(records, variant, &mut rand::thread_rng(), Utc::now())
    }

    /// Build with an explicit random source and reference time.
    pub fn build_with<R: Rng + ?Sized>(
        &self,
        records: &[MachineRecord],
        variant: ScheduleVariant,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Schedule {
        let session_id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let offset = rng.gen_range(1..=self.window_minutes);
        let execution_time = now + Duration::minutes(i64::from(offset));

        let mut scheduled = Vec::with_capacity(records.len());
        let mut skipped = 0;
        for machine in records {
            if let Err(e) = machine.validate() {
                debug!(error = %e, "dropping malformed machine record");
                skipped += 1;
                continue;
            }

            let action = self.rules.classify(machine.power_state);
            if action == ChaosAction::Unknown {
                skipped += 1;
                continue;
            }

            scheduled.push(to_scheduled(machine, session_id, action, execution_time, variant));
        }

        debug!(
            session_id = %session_id,
            variant = %variant,
            scheduled = scheduled.len(),
            skipped,
            execution_time = %execution_time,
            "schedule built"
        );

        Schedule {
            session_id,
            execution_time,
            variant,
            records: scheduled,
            skipped,
        }
    }
}

/// One-shot form of [`ScheduleBuilder::build`].
pub fn build_schedule(
    records: &[MachineRecord],
    window_minutes: u32,
    variant: ScheduleVariant,
) -> Result<Schedule, ChaosError> {
    Ok(ScheduleBuilder::new(window_minutes)?.build(records, variant))
}

fn to_scheduled(
    machine: &MachineRecord,
    session_id: Uuid,
    action: ChaosAction,
    execution_time: DateTime<Utc>,
    variant: ScheduleVariant,
) -> ScheduledActionRecord {
    let mut record = ScheduledActionRecord {
        session_id,
        target_resource_id: machine.resource_id.clone(),
        resource_name: machine.name.clone(),
        resource_group: machine.resource_group.clone(),
        action,
        execution_time,
        group: machine.group,
        scale_set_id: machine.scale_set_id.clone(),
        availability_set_id: machine.availability_set_id.clone(),
        availability_zone: None,
        fault_domain: None,
        update_domain: None,
        domain_flag: None,
    };

    match variant {
        ScheduleVariant::Standard => {}
        ScheduleVariant::AvailabilityZone => {
            record.availability_zone = machine.availability_zone;
        }
        ScheduleVariant::AvailabilitySet { domain_flag } => {
            record.fault_domain = machine.fault_domain;
            record.update_domain = machine.update_domain;
            record.domain_flag = Some(domain_flag);
        }
    }

    record
}
