mod aggregate;
mod bet;
mod card;
mod chunk;
mod coordinator;
mod counter;
mod derive;
mod error;
mod hand;
mod request;
mod response;
mod round;
mod rules;
mod run;
mod shoe;
mod strategy;

pub use aggregate::{AggregatedStats, BucketAcc, ChunkStats, aggregate};
pub use bet::{BetRamp, LastRoundOutcome, RampStep, WongOutPolicy, select_bet};
pub use card::{Card, RANKS};
pub use chunk::{ChunkConfig, ChunkProgress, run_chunk, run_chunk_with_progress};
pub use coordinator::{CoordinatorConfig, combine_progress, run_chunks, run_chunks_with_progress, run_coordinated};
pub use counter::{Counter, CountingSystem, RoundingMode, TcEstimationConfig, TcStep, quantize_tc};
pub use derive::{
    ConfidenceInterval, DerivedMetrics, KellyRow, NegativeEdgePolicy, TcTableRow, derive,
    finite_trip_ror, kelly_table, lifetime_ror, required_bankroll,
};
pub use error::SimError;
pub use hand::{
    Hand, HandOutcome, HandStatus, calculate_hand_value, can_split_cards, hand_value, is_blackjack,
    is_busted, is_soft_hand,
};
pub use request::{Settings, SimulationRequest};
pub use response::{ResultMeta, SimulationResult};
pub use round::{RoundObservation, bucket_for_tc, play_round};
pub use rules::{GameRules, PayoutRatio};
pub use run::{RunHandle, RunStatus, Runs, StatusSnapshot};
pub use shoe::Shoe;
pub use strategy::{Action, Deviation, HandKey, basic_action, deviation_override, hand_key_for};
