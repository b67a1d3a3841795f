use serde::{Deserialize, Serialize};

use crate::bet::BetRamp;
use crate::counter::{CountingSystem, RoundingMode, TcEstimationConfig, TcStep};
use crate::error::SimError;
use crate::rules::GameRules;
use crate::strategy::Deviation;

fn default_counting_system() -> CountingSystem {
    CountingSystem::default()
}

/// Display-only settings the engine reads for `hours_played` and the
/// Kelly/RoR advisory tables, plus the knobs that actually affect
/// simulation output (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Target number of rounds. Named "hands" in the transport contract
    /// for historical reasons; this engine counts rounds.
    pub hands: u64,
    pub seed: u64,
    /// Display-only: ignored by the engine, never affects unit-valued
    /// outputs. Carried through so a transport layer's "does this result
    /// still match the current config" check can ignore these fields.
    pub unit_size: f64,
    pub bankroll: Option<f64>,
    pub hands_per_hour: Option<f64>,
    pub deck_estimation_step: TcStep,
    pub deck_estimation_rounding: RoundingMode,
    pub use_estimated_tc_for_bet: bool,
    pub use_estimated_tc_for_deviations: bool,
    pub use_multiprocessing: bool,
    /// Worker count when `use_multiprocessing` is set; ignored (treated
    /// as 1) otherwise.
    pub worker_count: u64,
}

impl Settings {
    pub fn count_cfg(&self) -> TcEstimationConfig {
        TcEstimationConfig {
            step: self.deck_estimation_step,
            rounding: self.deck_estimation_rounding,
            use_for_bet: self.use_estimated_tc_for_bet,
            use_for_deviations: self.use_estimated_tc_for_deviations,
        }
        .normalized()
    }

    /// Worker count actually used (spec §5 "bounded pool of size
    /// W = min(cpu_count-1, configured)"). `worker_count = 0` means
    /// "auto": size the pool to the host's CPU count.
    pub fn effective_worker_count(&self) -> u64 {
        if !self.use_multiprocessing {
            return 1;
        }
        if self.worker_count == 0 {
            (num_cpus::get() as u64).max(1)
        } else {
            self.worker_count
        }
    }
}

/// The full simulation request (spec §6). Constructed by the transport
/// layer; validated once, synchronously, before a run is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub rules: GameRules,
    /// Tag map used for the running count (spec §6 `counting_system`,
    /// "defaulted to Hi-Lo"). Only Hi-Lo drives the shipped charts, so a
    /// non-Hi-Lo map here changes the count the deviations/ramp see but
    /// not what they do with it.
    #[serde(default = "default_counting_system")]
    pub counting_system: CountingSystem,
    pub deviations: Vec<Deviation>,
    pub bet_ramp: BetRamp,
    pub settings: Settings,
}

impl SimulationRequest {
    /// Synchronous validation per spec §7: invalid rules or ramp are
    /// reported before any run is created, never as a mid-run error.
    pub fn validate(&self) -> Result<(), SimError> {
        self.rules.validate()?;
        self.bet_ramp.validate()?;
        if self.settings.hands == 0 {
            return Err(SimError::InvalidRequest(
                "settings.hands must be positive".to_string(),
            ));
        }
        for &rank in &crate::card::RANKS {
            if !self.counting_system.tags.contains_key(&rank) {
                return Err(SimError::InvalidRequest(
                    "counting_system must tag every rank".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::{RampStep, WongOutPolicy};

    fn base_request() -> SimulationRequest {
        SimulationRequest {
            rules: GameRules::default(),
            counting_system: CountingSystem::default(),
            deviations: vec![],
            bet_ramp: BetRamp {
                steps: vec![RampStep {
                    tc_floor: -100,
                    units: 1,
                }],
                wong_out_below_tc: None,
                wong_out_policy: WongOutPolicy::Anytime,
            },
            settings: Settings {
                hands: 1000,
                seed: 1,
                unit_size: 1.0,
                bankroll: None,
                hands_per_hour: None,
                deck_estimation_step: TcStep::Exact,
                deck_estimation_rounding: RoundingMode::Nearest,
                use_estimated_tc_for_bet: false,
                use_estimated_tc_for_deviations: false,
                use_multiprocessing: false,
                worker_count: 1,
            },
        }
    }

    #[test]
    fn default_counting_system_is_hi_lo() {
        let request = base_request();
        assert_eq!(request.counting_system, CountingSystem::hi_lo());
    }

    #[test]
    fn validate_rejects_a_counting_system_missing_a_rank() {
        let mut request = base_request();
        request.counting_system.tags.remove(&crate::card::Card::Ace);
        assert!(request.validate().is_err());
    }

    #[test]
    fn worker_count_zero_with_multiprocessing_means_auto() {
        let mut settings = base_request().settings;
        settings.use_multiprocessing = true;
        settings.worker_count = 0;
        assert!(settings.effective_worker_count() >= 1);
    }

    #[test]
    fn worker_count_is_used_as_given_when_nonzero() {
        let mut settings = base_request().settings;
        settings.use_multiprocessing = true;
        settings.worker_count = 3;
        assert_eq!(settings.effective_worker_count(), 3);
    }
}
