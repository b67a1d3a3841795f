use serde::{Deserialize, Serialize};

/// A dealt card. Suits never affect blackjack play, so only rank is
/// tracked; `Ten` stands for ten, jack, queen, and king alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Card {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
}

/// All ranks in counting order, `Ace` first. Used to build a shoe and to
/// index rank-count arrays.
pub const RANKS: [Card; 10] = [
    Card::Ace,
    Card::Two,
    Card::Three,
    Card::Four,
    Card::Five,
    Card::Six,
    Card::Seven,
    Card::Eight,
    Card::Nine,
    Card::Ten,
];

impl Card {
    /// Hard blackjack value: aces count as 11 here, demoted by the caller
    /// (see [`crate::hand`]) when the hand would otherwise bust.
    pub fn value(self) -> u8 {
        match self {
            Card::Ace => 11,
            Card::Two => 2,
            Card::Three => 3,
            Card::Four => 4,
            Card::Five => 5,
            Card::Six => 6,
            Card::Seven => 7,
            Card::Eight => 8,
            Card::Nine => 9,
            Card::Ten => 10,
        }
    }

    /// Number of copies of this rank per single deck (`Ten` covers four
    /// physical ranks: ten, jack, queen, king).
    pub fn per_deck_count(self) -> u16 {
        if self == Card::Ten {
            16
        } else {
            4
        }
    }

    /// Hi-Lo counting tag (spec §3 `CountingSystem`).
    pub fn hi_lo_tag(self) -> i32 {
        match self {
            Card::Two | Card::Three | Card::Four | Card::Five | Card::Six => 1,
            Card::Seven | Card::Eight | Card::Nine => 0,
            Card::Ten | Card::Ace => -1,
        }
    }

    /// Index into a 10-slot rank-count array (`Ace` = 0 .. `Ten` = 9).
    pub fn index(self) -> usize {
        self as usize
    }
}
