use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::card::{Card, RANKS};

/// Step size for quantizing the true count into what a human counter
/// would estimate (spec §3 `TCEstimation`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TcStep {
    /// No quantization: deviations/bets see the exact true count.
    Exact,
    HalfDeck,
    FullDeck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingMode {
    Nearest,
    Floor,
    Ceil,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TcEstimationConfig {
    pub step: TcStep,
    pub rounding: RoundingMode,
    pub use_for_bet: bool,
    pub use_for_deviations: bool,
}

impl Default for TcEstimationConfig {
    fn default() -> Self {
        Self {
            step: TcStep::Exact,
            rounding: RoundingMode::Nearest,
            use_for_bet: false,
            use_for_deviations: false,
        }
    }
}

impl TcEstimationConfig {
    /// `step=0` forces both `use_for_*` off (spec §3): the exact true
    /// count is used internally regardless, so "estimate" is meaningless.
    pub fn normalized(mut self) -> Self {
        if self.step == TcStep::Exact {
            self.use_for_bet = false;
            self.use_for_deviations = false;
        }
        self
    }
}

fn round_with_mode(x: f64, mode: RoundingMode) -> f64 {
    match mode {
        RoundingMode::Nearest => x.round(),
        RoundingMode::Floor => x.floor(),
        RoundingMode::Ceil => x.ceil(),
    }
}

/// Quantizes an exact true count per spec §4.2:
/// `step=0.5 -> round(2*TC)/2`, `step=1.0 -> integer quantization`.
pub fn quantize_tc(exact: f64, cfg: TcEstimationConfig) -> f64 {
    match cfg.step {
        TcStep::Exact => exact,
        TcStep::HalfDeck => round_with_mode(exact * 2.0, cfg.rounding) / 2.0,
        TcStep::FullDeck => round_with_mode(exact, cfg.rounding),
    }
}

/// A counting system: an explicit rank->tag map (spec §3
/// `CountingSystem`, spec §6 request field, "defaulted to Hi-Lo"). Only
/// Hi-Lo drives the shipped strategy charts and deviations, but the
/// wire contract carries the map itself rather than a system name, so a
/// caller can hand in any zero-sum tag assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountingSystem {
    pub tags: BTreeMap<Card, i32>,
}

impl CountingSystem {
    pub fn hi_lo() -> Self {
        Self {
            tags: RANKS.iter().map(|&c| (c, c.hi_lo_tag())).collect(),
        }
    }

    pub fn tag(&self, card: Card) -> i32 {
        self.tags.get(&card).copied().unwrap_or(0)
    }
}

impl Default for CountingSystem {
    fn default() -> Self {
        Self::hi_lo()
    }
}

/// Running-count tracker under a configured rank->tag map (spec §3
/// `CountingSystem`).
#[derive(Debug, Clone)]
pub struct Counter {
    running_count: i32,
    system: CountingSystem,
}

impl Counter {
    /// Hi-Lo counter, the engine's default system.
    pub fn new() -> Self {
        Self::with_system(CountingSystem::default())
    }

    pub fn with_system(system: CountingSystem) -> Self {
        Self {
            running_count: 0,
            system,
        }
    }

    pub fn update(&mut self, card: Card) {
        self.running_count += self.system.tag(card);
    }

    pub fn reset(&mut self) {
        self.running_count = 0;
    }

    pub fn running_count(&self) -> i32 {
        self.running_count
    }

    /// `RC / (cards_remaining / 52)`, i.e. running count per deck
    /// remaining. Spec §4.2.
    pub fn true_count_exact(&self, cards_remaining: u32) -> f64 {
        let decks_remaining = cards_remaining as f64 / 52.0;
        if decks_remaining <= 0.0 {
            return self.running_count as f64;
        }
        self.running_count as f64 / decks_remaining
    }

    /// Estimated TC used for bet selection / deviation lookup, per the
    /// configured quantization.
    pub fn true_count_estimated(&self, cards_remaining: u32, cfg: TcEstimationConfig) -> f64 {
        quantize_tc(self.true_count_exact(cards_remaining), cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_count_is_sum_of_tags() {
        let mut counter = Counter::new();
        for card in [Card::Two, Card::Three, Card::Ten, Card::Ace] {
            counter.update(card);
        }
        // +1 +1 -1 -1 = 0
        assert_eq!(counter.running_count(), 0);
    }

    #[test]
    fn reset_zeroes_running_count() {
        let mut counter = Counter::new();
        counter.update(Card::Two);
        counter.reset();
        assert_eq!(counter.running_count(), 0);
    }

    #[test]
    fn true_count_divides_by_decks_remaining() {
        let mut counter = Counter::new();
        for _ in 0..10 {
            counter.update(Card::Two); // RC = 10
        }
        // 2 decks remaining (104 cards) -> TC = 5.0
        assert!((counter.true_count_exact(104) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn exact_step_forces_estimation_off() {
        let cfg = TcEstimationConfig {
            step: TcStep::Exact,
            use_for_bet: true,
            use_for_deviations: true,
            ..Default::default()
        }
        .normalized();
        assert!(!cfg.use_for_bet);
        assert!(!cfg.use_for_deviations);
    }

    #[test]
    fn half_deck_quantization_rounds_to_nearest_half() {
        let cfg = TcEstimationConfig {
            step: TcStep::HalfDeck,
            rounding: RoundingMode::Nearest,
            ..Default::default()
        };
        assert!((quantize_tc(2.3, cfg) - 2.5).abs() < 1e-9);
        assert!((quantize_tc(2.2, cfg) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn full_deck_quantization_floor_vs_ceil() {
        let floor_cfg = TcEstimationConfig {
            step: TcStep::FullDeck,
            rounding: RoundingMode::Floor,
            ..Default::default()
        };
        let ceil_cfg = TcEstimationConfig {
            step: TcStep::FullDeck,
            rounding: RoundingMode::Ceil,
            ..Default::default()
        };
        assert!((quantize_tc(2.7, floor_cfg) - 2.0).abs() < 1e-9);
        assert!((quantize_tc(2.1, ceil_cfg) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn hi_lo_counting_system_matches_card_tags() {
        let system = CountingSystem::hi_lo();
        for &card in &RANKS {
            assert_eq!(system.tag(card), card.hi_lo_tag());
        }
    }

    #[test]
    fn counter_honors_a_custom_tag_map() {
        let mut tags = BTreeMap::new();
        for &card in &RANKS {
            tags.insert(card, 0);
        }
        tags.insert(Card::Two, 3);
        let mut counter = Counter::with_system(CountingSystem { tags });
        counter.update(Card::Two);
        counter.update(Card::Ten);
        assert_eq!(counter.running_count(), 3);
    }
}
