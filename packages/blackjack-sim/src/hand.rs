use serde::{Deserialize, Serialize};

use crate::card::Card;

/// Final disposition of one hand at settlement (spec §3 `Hand`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandOutcome {
    Win,
    Loss,
    Push,
    Surrender,
    Blackjack,
}

/// Hard total plus ace-demotion, as in spec §3: "aces counted as 11
/// unless that busts, then demoted by 10". Returns `(total, is_soft)`.
pub fn hand_value(cards: &[Card]) -> (u8, bool) {
    let mut total: u16 = 0;
    let mut aces = 0u8;
    for &card in cards {
        let v = card.value();
        if v == 11 {
            aces += 1;
        }
        total += v as u16;
    }
    while total > 21 && aces > 0 {
        total -= 10;
        aces -= 1;
    }
    // Soft iff at least one ace is still counted as 11.
    (total as u8, aces > 0)
}

pub fn calculate_hand_value(cards: &[Card]) -> u8 {
    hand_value(cards).0
}

pub fn is_soft_hand(cards: &[Card]) -> bool {
    hand_value(cards).1
}

pub fn is_busted(cards: &[Card]) -> bool {
    calculate_hand_value(cards) > 21
}

pub fn is_blackjack(cards: &[Card]) -> bool {
    cards.len() == 2 && calculate_hand_value(cards) == 21
}

pub fn can_split_cards(card1: Card, card2: Card) -> bool {
    card1 == card2
}

/// Current disposition of a live hand during play (spec §3 `Hand`
/// invariants: split allowed only on an equal-value initial pair;
/// double/surrender only on the initial two cards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandStatus {
    Active,
    Standing,
    Busted,
    Blackjack,
    Doubled,
    Surrendered,
    /// A split-ace hand that took exactly one card and cannot act again
    /// (unless `hit_split_aces` is set, in which case it stays `Active`).
    SplitAceLocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hand {
    pub cards: Vec<Card>,
    pub status: HandStatus,
    /// True once this hand came from a split; disables surrender and
    /// (unless `double_after_split`) doubling.
    pub from_split: bool,
    /// Depth in the split tree: 0 for the original hand, 1 after one
    /// split, etc. Used against `max_splits`.
    pub split_depth: u8,
}

impl Hand {
    pub fn new() -> Self {
        Self {
            cards: Vec::new(),
            status: HandStatus::Active,
            from_split: false,
            split_depth: 0,
        }
    }

    pub fn value(&self) -> u8 {
        calculate_hand_value(&self.cards)
    }

    pub fn is_soft(&self) -> bool {
        is_soft_hand(&self.cards)
    }

    pub fn is_busted(&self) -> bool {
        is_busted(&self.cards)
    }

    pub fn is_blackjack(&self) -> bool {
        !self.from_split && is_blackjack(&self.cards)
    }

    pub fn add_card(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn can_split(&self, max_splits: u8) -> bool {
        self.cards.len() == 2
            && can_split_cards(self.cards[0], self.cards[1])
            && self.split_depth < max_splits
    }

    /// First decision on the original (non-split) two-card hand: the
    /// only point surrender is legal (spec §3 `Hand` invariants).
    pub fn can_surrender(&self, surrender_allowed: bool) -> bool {
        surrender_allowed && !self.from_split && self.cards.len() == 2
    }

    /// Doubling is legal only on the initial two cards, and only on a
    /// split hand when `double_after_split` is set.
    pub fn can_double(&self, double_after_split: bool) -> bool {
        self.cards.len() == 2 && (!self.from_split || double_after_split)
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self.status, HandStatus::Active)
    }
}

impl Default for Hand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculate_hand_value_simple() {
        assert_eq!(calculate_hand_value(&[Card::Two, Card::Three]), 5);
    }

    #[test]
    fn calculate_hand_value_with_face_cards() {
        assert_eq!(calculate_hand_value(&[Card::Ten, Card::Ten]), 20);
    }

    #[test]
    fn calculate_hand_value_blackjack() {
        assert_eq!(calculate_hand_value(&[Card::Ace, Card::Ten]), 21);
    }

    #[test]
    fn calculate_hand_value_soft_ace() {
        assert_eq!(calculate_hand_value(&[Card::Ace, Card::Six]), 17);
        assert!(is_soft_hand(&[Card::Ace, Card::Six]));
    }

    #[test]
    fn calculate_hand_value_hard_ace_after_demotion() {
        let cards = [Card::Ace, Card::Six, Card::Nine];
        assert_eq!(calculate_hand_value(&cards), 16);
        assert!(!is_soft_hand(&cards));
    }

    #[test]
    fn calculate_hand_value_multiple_aces() {
        let cards = [Card::Ace, Card::Ace, Card::Nine];
        assert_eq!(calculate_hand_value(&cards), 21);
        assert!(is_soft_hand(&cards));
    }

    #[test]
    fn is_busted_detects_overflow() {
        assert!(is_busted(&[Card::Ten, Card::Ten, Card::Five]));
        assert!(!is_busted(&[Card::Ten, Card::Ten]));
    }

    #[test]
    fn is_blackjack_requires_two_cards() {
        assert!(is_blackjack(&[Card::Ace, Card::Ten]));
        assert!(!is_blackjack(&[Card::Seven, Card::Seven, Card::Seven]));
    }

    #[test]
    fn can_split_cards_same_value_only() {
        assert!(can_split_cards(Card::Eight, Card::Eight));
        assert!(!can_split_cards(Card::Eight, Card::Nine));
        assert!(can_split_cards(Card::Ten, Card::Ten));
    }

    #[test]
    fn hand_struct_value_and_split() {
        let mut hand = Hand::new();
        hand.add_card(Card::Ten);
        hand.add_card(Card::Seven);
        assert_eq!(hand.value(), 17);
        assert!(!hand.can_split(3));

        let mut pair = Hand::new();
        pair.add_card(Card::Eight);
        pair.add_card(Card::Eight);
        assert!(pair.can_split(3));
        pair.add_card(Card::Two);
        assert!(!pair.can_split(3));
    }

    #[test]
    fn split_hand_cannot_surrender_or_get_natural_blackjack() {
        let mut hand = Hand::new();
        hand.from_split = true;
        hand.add_card(Card::Ace);
        hand.add_card(Card::Ten);
        assert!(!hand.is_blackjack());
        assert!(!hand.can_surrender(true));
    }

    #[test]
    fn double_after_split_gate() {
        let mut hand = Hand::new();
        hand.from_split = true;
        hand.add_card(Card::Five);
        hand.add_card(Card::Six);
        assert!(!hand.can_double(false));
        assert!(hand.can_double(true));
    }
}
