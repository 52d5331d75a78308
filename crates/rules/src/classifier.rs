//! Power state → chaos action classification.
//!
//! Running and starting machines are powered off, stopping and stopped
//! machines are started. Deallocating, deallocated, and unknown states get no
//! action.

use chaos_core::config::SchedulerConfig;
use chaos_core::{ChaosAction, ChaosError, PowerState};
use tracing::debug;

/// The fixed classification rule.
pub fn classify(state: PowerState) -> ChaosAction {
    match state {
        PowerState::Running | PowerState::Starting => ChaosAction::PowerOff,
        PowerState::Stopping | PowerState::Stopped => ChaosAction::Start,
        PowerState::Deallocating | PowerState::Deallocated | PowerState::Unknown => ChaosAction::Unknown,
    }
}

/// Classify a raw provider label. Unparsable labels yield [`ChaosAction::Unknown`].
pub fn classify_label(label: &str) -> ChaosAction {
    classify(PowerState::parse(label))
}

/// State → action table with per-state overrides.
///
/// Every provider state has an explicit entry; the defaults are exactly
/// [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRules {
    table: [(PowerState, ChaosAction); PowerState::COUNT],
}

impl ActionRules {
    pub fn new() -> Self {
        Self {
            table: PowerState::ALL.map(|state| (state, classify(state))),
        }
    }

    /// Replace the action for one state.
    pub fn with_override(mut self, state: PowerState, action: ChaosAction) -> Self {
        for entry in self.table.iter_mut() {
            if entry.0 == state {
                entry.1 = action;
            }
        }
        self
    }

    /// Default rules with the overrides named in the scheduler config.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ChaosError> {
        let rules = config
            .parsed_overrides()?
            .into_iter()
            .fold(Self::new(), |rules, (state, action)| {
                debug!(state = %state, action = %action, "action override");
                rules.with_override(state, action)
            });
        Ok(rules)
    }

    pub fn classify(&self, state: PowerState) -> ChaosAction {
        self.table
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, action)| *action)
            .unwrap_or(ChaosAction::Unknown)
    }

    /// States that currently map to an actionable chaos action.
    pub fn actionable_states(&self) -> Vec<PowerState> {
        self.table
            .iter()
            .filter(|(_, action)| action.is_actionable())
            .map(|(state, _)| *state)
            .collect()
    }
}

impl Default for ActionRules {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_states_power_off() {
        for state in [PowerState::Running, PowerState::Starting] {
            assert_eq!(classify(state), ChaosAction::PowerOff);
        }
    }

    #[test]
    fn down_states_start() {
        for state in [PowerState::Stopping, PowerState::Stopped] {
            assert_eq!(classify(state), ChaosAction::Start);
        }
    }

    #[test]
    fn other_states_are_left_alone() {
        for state in [PowerState::Deallocating, PowerState::Deallocated, PowerState::Unknown] {
            assert_eq!(classify(state), ChaosAction::Unknown);
        }
    }

    #[test]
    fn labels_including_garbage() {
        assert_eq!(classify_label("Running"), ChaosAction::PowerOff);
        assert_eq!(classify_label("PowerState/stopped"), ChaosAction::Start);
        assert_eq!(classify_label("Deallocated"), ChaosAction::Unknown);
        assert_eq!(classify_label(""), ChaosAction::Unknown);
        assert_eq!(classify_label("\u{1F525} hot"), ChaosAction::Unknown);
    }

    #[test]
    fn default_rules_match_classify() {
        let rules = ActionRules::default();
        for state in PowerState::ALL {
            assert_eq!(rules.classify(state), classify(state), "{state}");
        }
        assert_eq!(
            rules.actionable_states(),
            vec![PowerState::Running, PowerState::Starting, PowerState::Stopping, PowerState::Stopped]
        );
    }

    #[test]
    fn override_replaces_single_state() {
        let rules = ActionRules::new().with_override(PowerState::Starting, ChaosAction::Unknown);
        assert_eq!(rules.classify(PowerState::Starting), ChaosAction::Unknown);
        assert_eq!(rules.classify(PowerState::Running), ChaosAction::PowerOff);
    }

    #[test]
    fn rules_from_config() {
        let config = SchedulerConfig {
            action_overrides: Some("stopping=unknown".into()),
            ..SchedulerConfig::default()
        };
        let rules = ActionRules::from_config(&config).unwrap();
        assert_eq!(rules.classify(PowerState::Stopping), ChaosAction::Unknown);
        assert_eq!(rules.classify(PowerState::Stopped), ChaosAction::Start);

        let bad = SchedulerConfig {
            action_overrides: Some("stopping".into()),
            ..SchedulerConfig::default()
        };
        assert!(ActionRules::from_config(&bad).is_err());
    }
}
