use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// A blackjack payout ratio, e.g. 3:2 or 6:5, kept exact rather than as a
/// float so `calculate_payout` never drifts off a whole number of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRatio {
    pub numerator: u16,
    pub denominator: u16,
}

impl PayoutRatio {
    pub fn new(numerator: u16, denominator: u16) -> Result<Self, SimError> {
        if denominator == 0 {
            return Err(SimError::InvalidRequest(
                "payout ratio denominator must be nonzero".into(),
            ));
        }
        if numerator < denominator {
            return Err(SimError::InvalidRequest(
                "blackjack payout must be at least 1:1".into(),
            ));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub const THREE_TO_TWO: PayoutRatio = PayoutRatio {
        numerator: 3,
        denominator: 2,
    };
    pub const SIX_TO_FIVE: PayoutRatio = PayoutRatio {
        numerator: 6,
        denominator: 5,
    };

    /// Exact payout (not counting the returned original bet) for a
    /// winning blackjack of `bet_units` units, rounded down to the
    /// nearest whole unit the way a table pays out.
    pub fn calculate_payout(self, bet_units: i64) -> i64 {
        (bet_units * self.numerator as i64) / self.denominator as i64
    }

    pub fn as_fraction(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

/// Immutable table-rule record consumed by the round engine (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameRules {
    /// Number of decks in the shoe, 1..=8.
    pub decks: u8,
    /// Fraction of the shoe dealt before the cut card forces a reshuffle
    /// at the next round boundary, in (0.5, 0.95].
    pub penetration: f64,
    /// Dealer hits soft 17 (H17) instead of standing (S17).
    pub hit_soft_17: bool,
    /// Dealer peeks under a ten or ace up-card for blackjack.
    pub dealer_peeks: bool,
    /// Blackjack payout ratio, e.g. 3:2 or 6:5.
    pub blackjack_payout: PayoutRatio,
    /// Doubling allowed on any first two cards, not just 9/10/11.
    pub double_any_two: bool,
    /// Doubling allowed after splitting.
    pub double_after_split: bool,
    /// Surrender allowed on the initial two-card hand.
    pub surrender: bool,
    /// Split aces may be resplit if another ace is drawn.
    pub resplit_aces: bool,
    /// A split-ace hand may be hit instead of locked after one card.
    pub hit_split_aces: bool,
    /// Maximum number of splits per original hand, 0..=4.
    pub max_splits: u8,
}

impl Default for GameRules {
    /// Typical 6-deck Las Vegas Strip rules.
    fn default() -> Self {
        Self {
            decks: 6,
            penetration: 0.75,
            hit_soft_17: true,
            dealer_peeks: true,
            blackjack_payout: PayoutRatio::THREE_TO_TWO,
            double_any_two: true,
            double_after_split: true,
            surrender: true,
            resplit_aces: false,
            hit_split_aces: false,
            max_splits: 3,
        }
    }
}

impl GameRules {
    /// European no-hole-card rules: dealer doesn't peek, no surrender.
    pub fn european() -> Self {
        Self {
            dealer_peeks: false,
            surrender: false,
            hit_soft_17: false,
            ..Self::default()
        }
    }

    /// Atlantic City rules: 8 decks, S17, surrender, DAS.
    pub fn atlantic_city() -> Self {
        Self {
            decks: 8,
            hit_soft_17: false,
            ..Self::default()
        }
    }

    /// Single-deck rules, commonly paired with a 6:5 blackjack payout.
    pub fn single_deck() -> Self {
        Self {
            decks: 1,
            penetration: 0.5,
            hit_soft_17: true,
            blackjack_payout: PayoutRatio::SIX_TO_FIVE,
            double_any_two: false,
            double_after_split: false,
            surrender: false,
            max_splits: 0,
            ..Self::default()
        }
    }

    /// Validates the invariants listed in spec §3/§7. Called once at
    /// `start`; a violation aborts synchronously before any run exists.
    pub fn validate(&self) -> Result<(), SimError> {
        if !(1..=8).contains(&self.decks) {
            return Err(SimError::InvalidRequest(format!(
                "decks must be in 1..=8, got {}",
                self.decks
            )));
        }
        if !(self.penetration > 0.5 && self.penetration <= 0.95) {
            return Err(SimError::InvalidRequest(format!(
                "penetration must be in (0.5, 0.95], got {}",
                self.penetration
            )));
        }
        if self.blackjack_payout.as_fraction() < 1.0 {
            return Err(SimError::InvalidRequest(
                "blackjack_payout must be at least 1:1".into(),
            ));
        }
        if self.max_splits > 4 {
            return Err(SimError::InvalidRequest(format!(
                "max_splits must be in 0..=4, got {}",
                self.max_splits
            )));
        }
        Ok(())
    }

    /// Number of cards in a freshly built shoe.
    pub fn shoe_size(&self) -> u32 {
        self.decks as u32 * 52
    }

    /// Index at which the cut card sits (spec §4.1).
    pub fn cut_index(&self) -> u32 {
        (self.decks as f64 * 52.0 * self.penetration).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_validate() {
        assert!(GameRules::default().validate().is_ok());
        assert!(GameRules::european().validate().is_ok());
        assert!(GameRules::atlantic_city().validate().is_ok());
        assert!(GameRules::single_deck().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_decks() {
        let mut rules = GameRules::default();
        rules.decks = 0;
        assert!(rules.validate().is_err());
        rules.decks = 9;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_penetration() {
        let mut rules = GameRules::default();
        rules.penetration = 0.5;
        assert!(rules.validate().is_err());
        rules.penetration = 0.96;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn payout_ratio_rejects_sub_unity() {
        assert!(PayoutRatio::new(4, 5).is_err());
        assert!(PayoutRatio::new(0, 1).is_err());
    }

    #[test]
    fn payout_calculation_matches_known_ratios() {
        assert_eq!(PayoutRatio::THREE_TO_TWO.calculate_payout(100), 150);
        assert_eq!(PayoutRatio::SIX_TO_FIVE.calculate_payout(100), 120);
    }

    #[test]
    fn cut_index_matches_penetration() {
        let rules = GameRules {
            decks: 6,
            penetration: 0.75,
            ..GameRules::default()
        };
        assert_eq!(rules.shoe_size(), 312);
        assert_eq!(rules.cut_index(), 234);
    }
}
