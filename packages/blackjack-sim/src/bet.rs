use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// One step of an ordered bet ramp: at true counts `>= tc_floor`, bet
/// `units` (spec §3 `BetRamp`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampStep {
    pub tc_floor: i32,
    pub units: u32,
}

/// When a player leaving the table mid-shoe (Wong-out) is permitted
/// (spec §3 `BetRamp.wong_out_policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WongOutPolicy {
    /// Leave any round, regardless of what the previous round did.
    Anytime,
    /// Leave only immediately after a round in which the player lost
    /// money (profit < 0).
    AfterLossOnly,
    /// Leave only at a hand boundary, i.e. whenever the previous round
    /// finished; in this engine every round is a hand boundary, so this
    /// behaves like `Anytime` except on the very first round of a shoe
    /// sit-in sequence.
    AfterHandOnly,
}

/// Outcome of the previous round, consulted by the Wong-out policy
/// (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastRoundOutcome {
    /// No previous round this shoe (first round, or just reshuffled).
    None,
    Completed { profit_was_negative: bool },
}

/// Ordered bet ramp plus Wong-out configuration (spec §3 `BetRamp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRamp {
    pub steps: Vec<RampStep>,
    pub wong_out_below_tc: Option<i32>,
    pub wong_out_policy: WongOutPolicy,
}

impl BetRamp {
    /// Normalizes `steps` into strictly-increasing `tc_floor` order,
    /// keeping only the steps the spec calls for: deduplicate equal
    /// floors (last one wins) and sort ascending.
    pub fn normalized(mut self) -> Self {
        self.steps.sort_by_key(|s| s.tc_floor);
        // `dedup_by_key` keeps the first of each run of duplicates; reverse
        // around it so the later (last-specified) step for a given floor
        // is the one that survives.
        self.steps.reverse();
        self.steps.dedup_by_key(|s| s.tc_floor);
        self.steps.reverse();
        self
    }

    /// Validates the invariants spec §3 lists: at least one step,
    /// strictly increasing floors (post-normalization that means no
    /// duplicates survived, i.e. nothing to dedup), nonnegative units.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.steps.is_empty() {
            return Err(SimError::InvalidRequest(
                "bet ramp must have at least one step".to_string(),
            ));
        }
        let mut prev: Option<i32> = None;
        for step in &self.steps {
            if let Some(p) = prev {
                if step.tc_floor <= p {
                    return Err(SimError::InvalidRequest(
                        "bet ramp steps must have strictly increasing tc_floor".to_string(),
                    ));
                }
            }
            prev = Some(step.tc_floor);
        }
        Ok(())
    }
}

/// Selects the initial bet in units for a round (spec §4.4). `tc_for_bet`
/// is whichever of exact/estimated TC the request's `use_for_bet` flag
/// selects; the caller resolves that before calling in.
pub fn select_bet(
    ramp: &BetRamp,
    tc_for_bet: f64,
    last_round_outcome: LastRoundOutcome,
) -> u32 {
    if let Some(threshold) = ramp.wong_out_below_tc {
        if tc_for_bet < threshold as f64 && wong_out_permitted(ramp.wong_out_policy, last_round_outcome) {
            return 0;
        }
    }
    ramp.steps
        .iter()
        .rev()
        .find(|s| (s.tc_floor as f64) <= tc_for_bet)
        .map(|s| s.units)
        .unwrap_or_else(|| ramp.steps[0].units)
}

fn wong_out_permitted(policy: WongOutPolicy, last_round_outcome: LastRoundOutcome) -> bool {
    match policy {
        // Every round in this engine is itself a hand boundary, so
        // `AfterHandOnly` imposes no extra restriction beyond `Anytime`.
        WongOutPolicy::Anytime | WongOutPolicy::AfterHandOnly => true,
        WongOutPolicy::AfterLossOnly => matches!(
            last_round_outcome,
            LastRoundOutcome::Completed {
                profit_was_negative: true
            }
        ),
    }
}
