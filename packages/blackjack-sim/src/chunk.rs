use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::aggregate::ChunkStats;
use crate::bet::{BetRamp, LastRoundOutcome};
use crate::counter::{Counter, CountingSystem, TcEstimationConfig};
use crate::error::SimError;
use crate::rules::GameRules;
use crate::round::play_round;
use crate::strategy::Deviation;

/// Inputs to one chunk worker (spec §4.7). Each worker owns its shoe,
/// counter, and RNG exclusively; nothing here is shared across workers.
pub struct ChunkConfig<'a> {
    pub rules: GameRules,
    pub counting_system: CountingSystem,
    pub deviations: &'a [Deviation],
    pub ramp: &'a BetRamp,
    pub count_cfg: TcEstimationConfig,
    pub target_rounds: u64,
    pub master_seed: u64,
    pub worker_index: u64,
}

/// A coarse progress snapshot published periodically by a chunk worker
/// (spec §4.7, §4.8). Never contributes to the final `SimulationResult`
/// directly (spec §9: "progress vs. correctness").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProgress {
    pub rounds_done: u64,
    pub rounds_total: u64,
    pub running_ev_est: f64,
    pub running_sd_est: f64,
    pub running_avg_bet_est: f64,
}

fn snapshot(stats: &ChunkStats, rounds_total: u64) -> ChunkProgress {
    let mean = stats.mean();
    let variance = stats.variance();
    ChunkProgress {
        rounds_done: stats.rounds,
        rounds_total,
        running_ev_est: mean * 100.0,
        running_sd_est: variance.sqrt() * 10.0,
        running_avg_bet_est: stats.avg_bet(),
    }
}

/// Derives this worker's RNG from the master seed using a counter-based
/// stream split (spec §9: "use a counter-based PRNG ... to obtain
/// independent streams cheaply; do not derive worker seeds by naive
/// arithmetic"). ChaCha8's `set_stream` selects an independent counter
/// sequence from the same seed/key, which is the documented way to get
/// statistically independent streams without touching the seed itself.
fn worker_rng(master_seed: u64, worker_index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(master_seed);
    rng.set_stream(worker_index);
    rng
}

/// Runs one chunk to completion (or until cancelled), producing a
/// self-contained `ChunkStats` (spec §4.7). `cancel` is checked every
/// `max(target_rounds/100, 1000)` rounds, per the spec's cadence.
pub fn run_chunk(config: &ChunkConfig, cancel: &Arc<AtomicBool>) -> Result<ChunkStats, SimError> {
    run_chunk_with_progress(config, cancel, |_| {})
}

/// Same as [`run_chunk`], but also invokes `on_progress` at the same
/// cadence as the cancellation check, so a coordinator can combine
/// per-worker snapshots into a live estimate (spec §4.8).
pub fn run_chunk_with_progress(
    config: &ChunkConfig,
    cancel: &Arc<AtomicBool>,
    mut on_progress: impl FnMut(ChunkProgress),
) -> Result<ChunkStats, SimError> {
    let mut rng = worker_rng(config.master_seed, config.worker_index);
    let mut shoe = crate::shoe::Shoe::new(config.rules, &mut rng);
    let mut counter = Counter::with_system(config.counting_system.clone());
    let mut stats = ChunkStats::new();
    let mut last_outcome = LastRoundOutcome::None;

    let check_interval = (config.target_rounds / 100).max(1000);
    let mut rounds = 0u64;
    let mut was_cancelled = false;

    while rounds < config.target_rounds {
        if rounds % check_interval == 0 && cancel.load(Ordering::Relaxed) {
            was_cancelled = true;
            break;
        }

        if shoe.must_reshuffle() {
            log::debug!(
                "worker {} reshuffling shoe after {rounds} of {} rounds",
                config.worker_index,
                config.target_rounds
            );
            shoe.reshuffle(&mut rng);
            counter.reset();
            last_outcome = LastRoundOutcome::None;
        }

        let cards_remaining = shoe.cards_remaining();
        let raw_bucket = crate::round::bucket_for_tc(counter.true_count_exact(cards_remaining));
        let est_bucket = crate::round::bucket_for_tc(
            counter.true_count_estimated(cards_remaining, config.count_cfg),
        );

        let obs = play_round(
            &mut shoe,
            &mut counter,
            &config.rules,
            config.deviations,
            config.count_cfg,
            config.ramp,
            last_outcome,
        )?;

        stats.observe(&obs, raw_bucket, est_bucket);
        last_outcome = LastRoundOutcome::Completed {
            profit_was_negative: obs.total_profit_units < 0.0,
        };
        rounds += 1;

        if rounds % check_interval == 0 {
            on_progress(snapshot(&stats, config.target_rounds));
        }
    }

    stats.was_cancelled = was_cancelled;
    Ok(stats)
}
