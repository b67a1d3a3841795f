use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::error::SimError;
use crate::hand::{can_split_cards, hand_value};
use crate::rules::GameRules;

/// A resolved player decision (spec §3 `Deviation.action`, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Hit,
    Stand,
    Double,
    Split,
    Surrender,
    Insurance,
}

/// Raw basic-strategy chart entry, before legality is applied. `DoubleElseHit`
/// and `DoubleElseStand` are the spec's "conditional outputs" (§4.3) that
/// collapse to their named fallback when doubling isn't legal right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChartAction {
    Hit,
    Stand,
    DoubleElseHit,
    DoubleElseStand,
    SurrenderElseStand,
}

fn resolve(chart: ChartAction, can_double: bool, can_surrender: bool) -> Action {
    match chart {
        ChartAction::Hit => Action::Hit,
        ChartAction::Stand => Action::Stand,
        ChartAction::DoubleElseHit => {
            if can_double {
                Action::Double
            } else {
                Action::Hit
            }
        }
        ChartAction::DoubleElseStand => {
            if can_double {
                Action::Double
            } else {
                Action::Stand
            }
        }
        ChartAction::SurrenderElseStand => {
            if can_surrender {
                Action::Surrender
            } else {
                Action::Stand
            }
        }
    }
}

/// Row index for a hard total, clamping everything at or below 8 (always
/// hit) and at or above 17 (always stand, barring surrender) into the end
/// rows. Columns throughout are `dealer_up.index()`: Ace, 2..9, Ten.
fn hard_row(total: u8) -> usize {
    total.clamp(8, 17) as usize - 8
}

/// Hard-total chart, columns Ace..Ten. Rows: <=8, 9, 10, 11, 12, 13, 14,
/// 15, 16, >=17. Standard multi-deck strategy; the 15/16 surrender cells
/// and the 11-vs-ace / soft-19-vs-6 double cells are adjusted for H17 vs
/// S17 in `hard_action`/`soft_action` below.
#[rustfmt::skip]
const HARD_CHART: [[ChartAction; 10]; 10] = {
    use ChartAction::*;
    [
        [Hit, Hit, Hit, Hit, Hit, Hit, Hit, Hit, Hit, Hit],                                         // <=8
        [Hit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, Hit, Hit, Hit, Hit], // 9
        [DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, Hit], // 10
        [DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit], // 11 (ace col adjusted for S17)
        [Hit, Hit, Stand, Stand, Stand, Stand, Hit, Hit, Hit, Hit],                                 // 12
        [Hit, Stand, Stand, Stand, Stand, Stand, Hit, Hit, Hit, Hit],                               // 13
        [Hit, Stand, Stand, Stand, Stand, Stand, Hit, Hit, Hit, Hit],                               // 14
        [Hit, Stand, Stand, Stand, Stand, Stand, Hit, Hit, Hit, SurrenderElseStand],                // 15
        [Hit, Stand, Stand, Stand, Stand, Stand, Hit, Hit, SurrenderElseStand, SurrenderElseStand], // 16
        [Stand, Stand, Stand, Stand, Stand, Stand, Stand, Stand, Stand, Stand],                    // >=17
    ]
};

/// Row index for a soft total (A+2=13 .. A+9=20); soft 21 is a natural
/// and never reaches strategy.
fn soft_row(total: u8) -> usize {
    total.clamp(13, 20) as usize - 13
}

#[rustfmt::skip]
const SOFT_CHART: [[ChartAction; 10]; 8] = {
    use ChartAction::*;
    [
        [Hit, Hit, Hit, DoubleElseHit, DoubleElseHit, Hit, Hit, Hit, Hit, Hit],        // A2 (13)
        [Hit, Hit, Hit, DoubleElseHit, DoubleElseHit, Hit, Hit, Hit, Hit, Hit],        // A3 (14)
        [Hit, Hit, DoubleElseHit, DoubleElseHit, DoubleElseHit, Hit, Hit, Hit, Hit, Hit], // A4 (15)
        [Hit, Hit, DoubleElseHit, DoubleElseHit, DoubleElseHit, Hit, Hit, Hit, Hit, Hit], // A5 (16)
        [Hit, DoubleElseHit, DoubleElseHit, DoubleElseHit, DoubleElseHit, Hit, Hit, Hit, Hit, Hit], // A6 (17)
        [Hit, Stand, DoubleElseStand, DoubleElseStand, DoubleElseStand, Stand, Stand, Hit, Hit, Hit], // A7 (18, ace col adjusted)
        [Stand, Stand, Stand, Stand, Stand, DoubleElseStand, Stand, Stand, Stand, Stand], // A8 (19, 6 col adjusted for S17)
        [Stand, Stand, Stand, Stand, Stand, Stand, Stand, Stand, Stand, Stand],        // A9 (20)
    ]
};

fn col(dealer_up: Card) -> usize {
    dealer_up.index()
}

/// Hard-hand lookup with the couple of cells that genuinely differ
/// between dealer-hits-soft-17 (H17) and dealer-stands-soft-17 (S17)
/// tables: H17 adds doubling 11 vs ace and surrendering 15 vs ace.
fn hard_action(total: u8, dealer_up: Card, hit_soft_17: bool) -> ChartAction {
    let row = hard_row(total);
    let base = HARD_CHART[row][col(dealer_up)];
    if dealer_up == Card::Ace {
        if total == 11 {
            return if hit_soft_17 {
                ChartAction::DoubleElseHit
            } else {
                ChartAction::Hit
            };
        }
        if total == 15 {
            return if hit_soft_17 {
                ChartAction::SurrenderElseStand
            } else {
                ChartAction::Hit
            };
        }
    }
    base
}

/// Soft-hand lookup with the one H17/S17-sensitive cell: soft 19 doubles
/// against a dealer 6 only when the dealer hits soft 17.
fn soft_action(total: u8, dealer_up: Card, hit_soft_17: bool) -> ChartAction {
    let row = soft_row(total);
    let base = SOFT_CHART[row][col(dealer_up)];
    if total == 19 && dealer_up == Card::Six {
        return if hit_soft_17 {
            ChartAction::DoubleElseStand
        } else {
            ChartAction::Stand
        };
    }
    base
}

/// Whether a starting pair should be split, independent of the
/// hit/stand/double chart above (spec §4.3, §4.5). Ported from a
/// hand-rolled cascade rather than a table, same shape the teacher crate
/// used before this spec needed rule-conditional hard/soft totals too.
fn should_split_pair(card: Card, dealer_up: Card) -> bool {
    let dealer_value = dealer_up.value();
    match card {
        Card::Ace | Card::Eight => true,
        Card::Ten => false,
        Card::Nine => dealer_value != 7 && dealer_value != 10 && dealer_value != 11,
        Card::Seven | Card::Six => (2..=7).contains(&dealer_value),
        Card::Three | Card::Two => (2..=7).contains(&dealer_value),
        Card::Four | Card::Five => false,
    }
}

/// Pure basic-strategy decision function keyed on the player hand, the
/// dealer's up-card, and table rules (spec §4.3). Legality flags come
/// from the round engine, which already knows whether this is the first
/// decision on an unsplit two-card hand.
pub fn basic_action(
    cards: &[Card],
    dealer_up: Card,
    can_double: bool,
    can_split: bool,
    can_surrender: bool,
    rules: &GameRules,
) -> Action {
    if can_split && cards.len() == 2 && can_split_cards(cards[0], cards[1]) {
        if should_split_pair(cards[0], dealer_up) {
            return Action::Split;
        }
        // A pair the chart doesn't split (e.g. a ten-pair) falls through
        // to ordinary hard-total strategy below.
    }

    let (total, is_soft) = hand_value(cards);
    let chart = if is_soft && total >= 13 && total <= 20 {
        soft_action(total, dealer_up, rules.hit_soft_17)
    } else {
        hard_action(total, dealer_up, rules.hit_soft_17)
    };
    let can_surrender = can_surrender && rules.surrender;
    resolve(chart, can_double, can_surrender)
}

/// What a deviation keys off of: one of the hand shapes spec §3 lists
/// (hard total, soft total, pair, or the insurance prompt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandKey {
    Hard(u8),
    Soft(u8),
    Pair(Card),
    Insurance,
}

impl FromStr for HandKey {
    type Err = SimError;

    /// Parses the compact textual form used in a request: `"insurance"`,
    /// `"H16"` (hard 16), `"S18"` (soft 18, i.e. ace + 7), `"P8"` (pair of
    /// 8s; `"PA"` aces, `"PT"` tens). Parsed once at request validation
    /// (spec §9: "parse deviation keys at request boundary").
    fn from_str(s: &str) -> Result<Self, SimError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("insurance") {
            return Ok(HandKey::Insurance);
        }
        let mut chars = s.chars();
        let prefix = chars
            .next()
            .ok_or_else(|| SimError::InvalidRequest("empty deviation hand_key".to_string()))?
            .to_ascii_uppercase();
        let rest: String = chars.collect();
        match prefix {
            'H' => rest
                .parse::<u8>()
                .map(HandKey::Hard)
                .map_err(|_| invalid_key(s)),
            'S' => rest
                .parse::<u8>()
                .map(HandKey::Soft)
                .map_err(|_| invalid_key(s)),
            'P' => parse_pair_rank(&rest).map(HandKey::Pair).ok_or_else(|| invalid_key(s)),
            _ => Err(invalid_key(s)),
        }
    }
}

fn invalid_key(s: &str) -> SimError {
    SimError::InvalidRequest(format!("malformed deviation hand_key: {s:?}"))
}

fn parse_pair_rank(s: &str) -> Option<Card> {
    match s.to_ascii_uppercase().as_str() {
        "A" => Some(Card::Ace),
        "2" => Some(Card::Two),
        "3" => Some(Card::Three),
        "4" => Some(Card::Four),
        "5" => Some(Card::Five),
        "6" => Some(Card::Six),
        "7" => Some(Card::Seven),
        "8" => Some(Card::Eight),
        "9" => Some(Card::Nine),
        "T" => Some(Card::Ten),
        _ => None,
    }
}

fn pair_rank_letter(card: Card) -> char {
    match card {
        Card::Ace => 'A',
        Card::Two => '2',
        Card::Three => '3',
        Card::Four => '4',
        Card::Five => '5',
        Card::Six => '6',
        Card::Seven => '7',
        Card::Eight => '8',
        Card::Nine => '9',
        Card::Ten => 'T',
    }
}

impl fmt::Display for HandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandKey::Hard(n) => write!(f, "H{n}"),
            HandKey::Soft(n) => write!(f, "S{n}"),
            HandKey::Pair(card) => write!(f, "P{}", pair_rank_letter(*card)),
            HandKey::Insurance => write!(f, "insurance"),
        }
    }
}

/// `HandKey` round-trips through JSON as the compact string form (e.g.
/// `"H16"`, `"P8"`, `"insurance"`), parsed at the request boundary per
/// spec §9 rather than carried as a bare string through the engine.
impl Serialize for HandKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HandKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<HandKey>().map_err(serde::de::Error::custom)
    }
}

/// One index-strategy deviation: at true count `tc_floor` or above, play
/// `action` instead of basic strategy for hands keyed by `hand_key`
/// (spec §3 `Deviation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deviation {
    pub hand_key: HandKey,
    pub tc_floor: i32,
    pub action: Action,
}

/// Stable rank used only to break ties between deviations that share the
/// same greatest matching `tc_floor` (spec §4.3: "R > S > D > P > H > I").
fn action_rank(action: Action) -> u8 {
    match action {
        Action::Surrender => 0,
        Action::Stand => 1,
        Action::Double => 2,
        Action::Split => 3,
        Action::Hit => 4,
        Action::Insurance => 5,
    }
}

/// Looks up the deviation, if any, that applies at `floor_tc` for
/// `hand_key`: the matching deviation with the greatest `tc_floor`,
/// ties broken by the action hierarchy above (spec §4.3).
pub fn deviation_override(
    hand_key: HandKey,
    floor_tc: i32,
    deviations: &[Deviation],
) -> Option<Action> {
    deviations
        .iter()
        .filter(|d| d.hand_key == hand_key && floor_tc >= d.tc_floor)
        .max_by_key(|d| (d.tc_floor, std::cmp::Reverse(action_rank(d.action))))
        .map(|d| d.action)
}

/// Builds the `HandKey` for the current hand, for deviation lookup during
/// play (not the insurance prompt, which always keys off `Insurance`).
pub fn hand_key_for(cards: &[Card]) -> HandKey {
    let (total, is_soft) = hand_value(cards);
    if is_soft && total < 21 {
        HandKey::Soft(total)
    } else {
        HandKey::Hard(total)
    }
}
