use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::card::{Card, RANKS};
use crate::error::SimError;
use crate::rules::GameRules;

/// A dealt, ordered multi-deck shoe with a cut-card position (spec §3
/// `Shoe`, §4.1). Cards are drawn front-to-back; reshuffling only ever
/// happens between rounds, never mid-deal.
pub struct Shoe {
    cards: Vec<Card>,
    pointer: usize,
    cut_index: usize,
    rules: GameRules,
}

/// Mid-round exhaustion would require drawing more cards than physically
/// exist in the shoe; §4.1 calls this a fatal engine invariant.
const SAFETY_MARGIN: usize = 20;

impl Shoe {
    pub fn new(rules: GameRules, rng: &mut ChaCha8Rng) -> Self {
        let mut shoe = Self {
            cards: Vec::with_capacity(rules.shoe_size() as usize),
            pointer: 0,
            cut_index: rules.cut_index() as usize,
            rules,
        };
        shoe.fill_and_shuffle(rng);
        shoe
    }

    fn fill_and_shuffle(&mut self, rng: &mut ChaCha8Rng) {
        self.cards.clear();
        for &rank in &RANKS {
            for _ in 0..(rank.per_deck_count() as u16 * self.rules.decks as u16) {
                self.cards.push(rank);
            }
        }
        self.cards.shuffle(rng);
        self.pointer = 0;
    }

    /// Draws the next card. A fatal invariant violation (never expected
    /// in practice: the cut card sits well inside the shoe and the
    /// safety margin guards the tail) if the shoe is truly exhausted.
    pub fn draw(&mut self) -> Result<Card, SimError> {
        if self.pointer >= self.cards.len() {
            log::error!(
                "shoe exhausted mid-round: pointer={} len={}",
                self.pointer,
                self.cards.len()
            );
            return Err(SimError::EngineInvariant(
                "shoe exhausted mid-round".to_string(),
            ));
        }
        let card = self.cards[self.pointer];
        self.pointer += 1;
        Ok(card)
    }

    pub fn cards_remaining(&self) -> u32 {
        (self.cards.len() - self.pointer) as u32
    }

    /// True once the pointer has crossed the cut card. Checked only at
    /// round boundaries (spec §4.1).
    pub fn must_reshuffle(&self) -> bool {
        self.pointer >= self.cut_index
    }

    /// Mid-round exhaustion is impossible in any real configuration: the
    /// cut card leaves at least `SAFETY_MARGIN` cards beyond it. Runs
    /// assert this at shoe construction rather than during play.
    pub fn has_safety_margin(&self) -> bool {
        self.cards.len() - self.cut_index >= SAFETY_MARGIN
    }

    pub fn reshuffle(&mut self, rng: &mut ChaCha8Rng) {
        self.fill_and_shuffle(rng);
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn card_conservation_over_a_full_shoe() {
        let rules = GameRules::default();
        let mut shoe = Shoe::new(rules, &mut rng());
        let mut counts = [0u32; 10];
        while let Ok(card) = shoe.draw() {
            counts[card.index()] += 1;
            if shoe.cards_remaining() == 0 {
                break;
            }
        }
        for &rank in &RANKS {
            let expected = rank.per_deck_count() as u32 * rules.decks as u32;
            assert_eq!(counts[rank.index()], expected);
        }
    }

    #[test]
    fn cut_index_leaves_a_safety_margin() {
        let rules = GameRules::default();
        let shoe = Shoe::new(rules, &mut rng());
        assert!(shoe.has_safety_margin());
    }

    #[test]
    fn reshuffle_resets_pointer() {
        let rules = GameRules::single_deck();
        let mut rng = rng();
        let mut shoe = Shoe::new(rules, &mut rng);
        for _ in 0..10 {
            shoe.draw().unwrap();
        }
        assert_eq!(shoe.pointer(), 10);
        shoe.reshuffle(&mut rng);
        assert_eq!(shoe.pointer(), 0);
    }

    #[test]
    fn must_reshuffle_trips_at_cut_card() {
        let rules = GameRules {
            decks: 1,
            penetration: 0.51, // small shoe, low penetration for a fast test
            ..GameRules::single_deck()
        };
        let mut shoe = Shoe::new(rules, &mut rng());
        assert!(!shoe.must_reshuffle());
        for _ in 0..shoe.cut_index {
            shoe.draw().unwrap();
        }
        assert!(shoe.must_reshuffle());
    }
}
