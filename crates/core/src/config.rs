use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::ChaosAction;
use crate::error::ChaosError;
use crate::machine::PowerState;

/// Largest atomic batch the table store accepts.
pub const STORE_BATCH_LIMIT: usize = 100;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

/// Numeric profiled env var. An unparsable value falls back to `default`
/// and is recorded in `invalid` so `Config::validate` can reject it.
fn profiled_env_num<T: FromStr>(profile: &str, key: &str, default: T, invalid: &mut Vec<String>) -> T {
    match profiled_env_opt(profile, key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                invalid.push(format!("{key}={raw:?}"));
                default
            }
        },
    }
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        None => default,
    }
}

fn profiled_env_list(profile: &str, key: &str) -> Vec<String> {
    profiled_env_opt(profile, key)
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub scheduler: SchedulerConfig,
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
    /// Env values that failed to parse, as `KEY="raw"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_values: Vec<String>,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CHAOS_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CHAOS_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let mut invalid = Vec::new();
        Self {
            profile: p.to_string(),
            scheduler: SchedulerConfig::from_env_profiled(p, &mut invalid),
            crawler: CrawlerConfig::from_env_profiled(p, &mut invalid),
            storage: StorageConfig::from_env_profiled(p, &mut invalid),
            invalid_values: invalid,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings no crawl cycle can run with.
    pub fn validate(&self) -> Result<(), ChaosError> {
        if !self.invalid_values.is_empty() {
            return Err(ChaosError::InvalidConfiguration(format!(
                "unparsable settings: {}",
                self.invalid_values.join(", ")
            )));
        }
        self.scheduler.validate()?;
        self.crawler.validate()?;
        self.storage.validate()?;
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   frequency={}m, zone_scheduling={}, fault_domain={}, overrides={}",
            self.scheduler.frequency_minutes,
            self.scheduler.zone_scheduling,
            self.scheduler.fault_domain,
            self.scheduler.action_overrides.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  crawler:     groups={}, excluded={}, workers={}, call_timeout={}s, cycle_timeout={}s",
            if self.crawler.resource_groups.is_empty() {
                "(all)".to_string()
            } else {
                self.crawler.resource_groups.join(",")
            },
            self.crawler.excluded_resource_groups.len(),
            self.crawler.worker_limit,
            self.crawler.call_timeout_secs,
            self.crawler.cycle_timeout_secs
        );
        tracing::info!(
            "  storage:     data_dir={}, max_batch={}",
            self.storage.data_dir.display(),
            self.storage.max_batch_size
        );
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Width of the randomized execution window, in minutes.
    pub frequency_minutes: u32,
    /// Schedule standalone and scale-set machines with zone metadata.
    pub zone_scheduling: bool,
    /// Availability sets: `true` = fault-domain semantics, `false` = update-domain.
    pub fault_domain: bool,
    /// Comma-separated `state=action` pairs, e.g. `starting=unknown`.
    pub action_overrides: Option<String>,
    /// Fixed RNG seed for reproducible schedules.
    pub rng_seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frequency_minutes: 15,
            zone_scheduling: false,
            fault_domain: true,
            action_overrides: None,
            rng_seed: None,
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str, invalid: &mut Vec<String>) -> Self {
        Self {
            frequency_minutes: profiled_env_num(p, "CHAOS_SCHEDULER_FREQUENCY_MINUTES", 15, invalid),
            zone_scheduling: profiled_env_bool(p, "CHAOS_ZONE_SCHEDULING", false),
            fault_domain: profiled_env_bool(p, "CHAOS_AVSET_FAULT_DOMAIN", true),
            action_overrides: profiled_env_opt(p, "CHAOS_ACTION_OVERRIDES"),
            rng_seed: match profiled_env_opt(p, "CHAOS_RNG_SEED") {
                Some(_) => Some(profiled_env_num(p, "CHAOS_RNG_SEED", 0, invalid)),
                None => None,
            },
        }
    }

    /// Parse `action_overrides` into `(state, action)` pairs.
    pub fn parsed_overrides(&self) -> Result<Vec<(PowerState, ChaosAction)>, ChaosError> {
        let Some(raw) = self.action_overrides.as_deref() else {
            return Ok(Vec::new());
        };
        split_list(raw)
            .iter()
            .map(|pair| {
                let (state, action) = pair.split_once('=').ok_or_else(|| {
                    ChaosError::InvalidConfiguration(format!("action override {pair:?} is not state=action"))
                })?;
                let parsed_state = PowerState::parse(state);
                if parsed_state == PowerState::Unknown && !state.trim().eq_ignore_ascii_case("unknown") {
                    return Err(ChaosError::InvalidConfiguration(format!(
                        "action override names unknown power state {state:?}"
                    )));
                }
                let parsed_action = ChaosAction::parse(action).ok_or_else(|| {
                    ChaosError::InvalidConfiguration(format!("action override names unknown action {action:?}"))
                })?;
                Ok((parsed_state, parsed_action))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ChaosError> {
        if self.frequency_minutes < 1 {
            return Err(ChaosError::InvalidConfiguration(
                "scheduler frequency must be at least 1 minute".into(),
            ));
        }
        self.parsed_overrides()?;
        Ok(())
    }
}

// ── Crawler ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Resource groups to crawl; empty = every group the inventory lists.
    pub resource_groups: Vec<String>,
    /// Never crawled, matched case-insensitively.
    pub excluded_resource_groups: Vec<String>,
    /// Max resource groups crawled concurrently.
    pub worker_limit: usize,
    pub call_timeout_secs: u64,
    pub cycle_timeout_secs: u64,
    pub crawl_virtual_machines: bool,
    pub crawl_scale_sets: bool,
    pub crawl_availability_sets: bool,
    /// Tick interval for the periodic trigger.
    pub trigger_interval_secs: u64,
    /// Fleet snapshot file read by the snapshot inventory.
    pub inventory_path: PathBuf,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            resource_groups: Vec::new(),
            excluded_resource_groups: Vec::new(),
            worker_limit: 4,
            call_timeout_secs: 30,
            cycle_timeout_secs: 600,
            crawl_virtual_machines: true,
            crawl_scale_sets: true,
            crawl_availability_sets: true,
            trigger_interval_secs: 900,
            inventory_path: PathBuf::from("data/inventory.json"),
        }
    }
}

impl CrawlerConfig {
    fn from_env_profiled(p: &str, invalid: &mut Vec<String>) -> Self {
        Self {
            resource_groups: profiled_env_list(p, "CHAOS_RESOURCE_GROUPS"),
            excluded_resource_groups: profiled_env_list(p, "CHAOS_EXCLUDED_RESOURCE_GROUPS"),
            worker_limit: profiled_env_num(p, "CHAOS_WORKER_LIMIT", 4, invalid),
            call_timeout_secs: profiled_env_num(p, "CHAOS_CALL_TIMEOUT_SECS", 30, invalid),
            cycle_timeout_secs: profiled_env_num(p, "CHAOS_CYCLE_TIMEOUT_SECS", 600, invalid),
            crawl_virtual_machines: profiled_env_bool(p, "CHAOS_CRAWL_VIRTUAL_MACHINES", true),
            crawl_scale_sets: profiled_env_bool(p, "CHAOS_CRAWL_SCALE_SETS", true),
            crawl_availability_sets: profiled_env_bool(p, "CHAOS_CRAWL_AVAILABILITY_SETS", true),
            trigger_interval_secs: profiled_env_num(p, "CHAOS_TRIGGER_INTERVAL_SECS", 900, invalid),
            inventory_path: PathBuf::from(profiled_env_or(p, "CHAOS_INVENTORY_PATH", "data/inventory.json")),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn trigger_interval(&self) -> Duration {
        Duration::from_secs(self.trigger_interval_secs)
    }

    /// Whether a resource group is on the exclude list.
    pub fn is_excluded(&self, resource_group: &str) -> bool {
        self.excluded_resource_groups
            .iter()
            .any(|g| g.eq_ignore_ascii_case(resource_group))
    }

    fn validate(&self) -> Result<(), ChaosError> {
        if self.worker_limit == 0 {
            return Err(ChaosError::InvalidConfiguration("worker limit must be at least 1".into()));
        }
        if self.call_timeout_secs == 0 || self.cycle_timeout_secs == 0 {
            return Err(ChaosError::InvalidConfiguration("timeouts must be non-zero".into()));
        }
        if self.trigger_interval_secs == 0 {
            return Err(ChaosError::InvalidConfiguration("trigger interval must be non-zero".into()));
        }
        Ok(())
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub virtual_machine_table: String,
    pub scale_set_table: String,
    pub schedule_table: String,
    pub error_table: String,
    pub max_batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            virtual_machine_table: "virtualmachinecrawler".into(),
            scale_set_table: "scalesetcrawler".into(),
            schedule_table: "scheduledrules".into(),
            error_table: "crawlererrors".into(),
            max_batch_size: STORE_BATCH_LIMIT,
        }
    }
}

impl StorageConfig {
    fn from_env_profiled(p: &str, invalid: &mut Vec<String>) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "CHAOS_DATA_DIR", "data")),
            virtual_machine_table: profiled_env_or(p, "CHAOS_VM_TABLE", "virtualmachinecrawler"),
            scale_set_table: profiled_env_or(p, "CHAOS_SCALE_SET_TABLE", "scalesetcrawler"),
            schedule_table: profiled_env_or(p, "CHAOS_SCHEDULE_TABLE", "scheduledrules"),
            error_table: profiled_env_or(p, "CHAOS_ERROR_TABLE", "crawlererrors"),
            max_batch_size: profiled_env_num(p, "CHAOS_MAX_BATCH_SIZE", STORE_BATCH_LIMIT, invalid),
        }
    }

    fn validate(&self) -> Result<(), ChaosError> {
        if self.max_batch_size == 0 || self.max_batch_size > STORE_BATCH_LIMIT {
            return Err(ChaosError::InvalidConfiguration(format!(
                "max batch size must be within 1..={STORE_BATCH_LIMIT}"
            )));
        }
        let tables = [
            &self.virtual_machine_table,
            &self.scale_set_table,
            &self.schedule_table,
            &self.error_table,
        ];
        if tables.iter().any(|t| t.trim().is_empty()) {
            return Err(ChaosError::InvalidConfiguration("table names must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.frequency_minutes, 15);
        assert_eq!(config.storage.max_batch_size, 100);
        assert_eq!(config.profile_label(), "default");
    }

    #[test]
    fn zero_window_is_invalid() {
        let mut config = Config::default();
        config.scheduler.frequency_minutes = 0;
        assert!(matches!(config.validate(), Err(ChaosError::InvalidConfiguration(_))));
    }

    #[test]
    fn batch_size_above_store_limit_is_invalid() {
        let mut config = Config::default();
        config.storage.max_batch_size = 101;
        assert!(config.validate().is_err());
        config.storage.max_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_is_invalid() {
        let mut config = Config::default();
        config.crawler.worker_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_parse() {
        let scheduler = SchedulerConfig {
            action_overrides: Some("starting=unknown, PowerState/stopping = skip".into()),
            ..SchedulerConfig::default()
        };
        let parsed = scheduler.parsed_overrides().unwrap();
        assert_eq!(
            parsed,
            vec![
                (PowerState::Starting, ChaosAction::Unknown),
                (PowerState::Stopping, ChaosAction::Unknown),
            ]
        );
    }

    #[test]
    fn overrides_reject_garbage() {
        for raw in ["starting", "migrating=start", "running=reboot"] {
            let scheduler = SchedulerConfig {
                action_overrides: Some(raw.into()),
                ..SchedulerConfig::default()
            };
            assert!(scheduler.parsed_overrides().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn excluded_groups_match_case_insensitively() {
        let crawler = CrawlerConfig {
            excluded_resource_groups: vec!["RG-Prod".into()],
            ..CrawlerConfig::default()
        };
        assert!(crawler.is_excluded("rg-prod"));
        assert!(!crawler.is_excluded("rg-dev"));
    }

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" a, ,b ,"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unparsable_numbers_are_invalid_configuration() {
        // Profile prefix keeps these vars away from other tests.
        std::env::set_var("BADNUM_CHAOS_SCHEDULER_FREQUENCY_MINUTES", "-5");
        std::env::set_var("BADNUM_CHAOS_WORKER_LIMIT", "abc");
        let config = Config::for_profile("badnum");

        assert_eq!(config.scheduler.frequency_minutes, 15);
        assert_eq!(config.invalid_values.len(), 2);
        assert!(config.invalid_values[0].contains("CHAOS_SCHEDULER_FREQUENCY_MINUTES"));
        match config.validate() {
            Err(ChaosError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("\"-5\""));
                assert!(msg.contains("\"abc\""));
            }
            other => panic!("expected InvalidConfiguration, got {other:?}"),
        }
    }

    #[test]
    fn profiled_numbers_parse() {
        std::env::set_var("GOODNUM_CHAOS_SCHEDULER_FREQUENCY_MINUTES", " 30 ");
        std::env::set_var("GOODNUM_CHAOS_RNG_SEED", "42");
        let config = Config::for_profile("goodnum");
        assert_eq!(config.scheduler.frequency_minutes, 30);
        assert_eq!(config.scheduler.rng_seed, Some(42));
        assert!(config.invalid_values.is_empty());
    }
}
