use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::aggregate::{AggregatedStats, ChunkStats, aggregate};
use crate::bet::BetRamp;
use crate::chunk::{ChunkConfig, ChunkProgress, run_chunk, run_chunk_with_progress};
use crate::counter::{CountingSystem, TcEstimationConfig};
use crate::error::SimError;
use crate::rules::GameRules;
use crate::strategy::Deviation;

/// Below this round target, or with a single worker, run in-line on the
/// calling thread rather than paying thread-pool setup cost (spec
/// §4.8 fallback).
const INLINE_FALLBACK_ROUNDS: u64 = 100_000;

/// Splits `target_rounds` across `worker_count` workers with sizes that
/// differ by at most one (spec §4.8).
fn split_rounds(target_rounds: u64, worker_count: u64) -> Vec<u64> {
    let base = target_rounds / worker_count;
    let remainder = target_rounds % worker_count;
    (0..worker_count)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Parameters for one coordinated run, independent of any run-registry
/// bookkeeping (spec §4.8).
pub struct CoordinatorConfig<'a> {
    pub rules: GameRules,
    pub counting_system: CountingSystem,
    pub deviations: &'a [Deviation],
    pub ramp: &'a BetRamp,
    pub count_cfg: TcEstimationConfig,
    pub target_rounds: u64,
    pub master_seed: u64,
    pub worker_count: u64,
}

/// Runs the full request to completion (or cancellation), splitting
/// across workers and aggregating their `ChunkStats` (spec §4.8/§4.9).
/// Falls back to a single in-line chunk for small requests or
/// `worker_count = 1`.
pub fn run_coordinated(
    config: &CoordinatorConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<AggregatedStats, SimError> {
    let chunks = run_chunks(config, cancel)?;
    Ok(aggregate(&chunks))
}

/// Runs the request and returns the raw per-worker `ChunkStats` before
/// aggregation, letting callers (e.g. a run registry) inspect
/// `was_cancelled` per chunk if desired.
pub fn run_chunks(
    config: &CoordinatorConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<ChunkStats>, SimError> {
    run_chunks_with_progress(config, cancel, None)
}

/// Same as [`run_chunks`], but when `progress_slots` is given (one slot
/// per worker, pre-sized to `worker_count`), each worker publishes its
/// latest [`ChunkProgress`] into its slot as it runs, so a caller on
/// another thread can read a live combined estimate (spec §4.8). `None`
/// preserves the plain, no-overhead path used by [`run_chunks`].
pub fn run_chunks_with_progress(
    config: &CoordinatorConfig,
    cancel: &Arc<AtomicBool>,
    progress_slots: Option<Arc<Vec<Mutex<ChunkProgress>>>>,
) -> Result<Vec<ChunkStats>, SimError> {
    let worker_count = config.worker_count.max(1);

    if config.target_rounds < INLINE_FALLBACK_ROUNDS || worker_count == 1 {
        let chunk_config = ChunkConfig {
            rules: config.rules,
            counting_system: config.counting_system.clone(),
            deviations: config.deviations,
            ramp: config.ramp,
            count_cfg: config.count_cfg,
            target_rounds: config.target_rounds,
            master_seed: config.master_seed,
            worker_index: 0,
        };
        let stats = match &progress_slots {
            Some(slots) => run_chunk_with_progress(&chunk_config, cancel, |p| {
                if let Some(slot) = slots.get(0) {
                    *slot.lock().unwrap() = p;
                }
            })?,
            None => run_chunk(&chunk_config, cancel)?,
        };
        return Ok(vec![stats]);
    }

    let sizes = split_rounds(config.target_rounds, worker_count);
    sizes
        .into_par_iter()
        .enumerate()
        .map(|(i, rounds)| {
            let chunk_config = ChunkConfig {
                rules: config.rules,
                counting_system: config.counting_system.clone(),
                deviations: config.deviations,
                ramp: config.ramp,
                count_cfg: config.count_cfg,
                target_rounds: rounds,
                master_seed: config.master_seed,
                worker_index: i as u64,
            };
            match &progress_slots {
                Some(slots) => run_chunk_with_progress(&chunk_config, cancel, |p| {
                    if let Some(slot) = slots.get(i) {
                        *slot.lock().unwrap() = p;
                    }
                }),
                None => run_chunk(&chunk_config, cancel),
            }
        })
        .collect()
}

/// Combines per-worker progress snapshots into one coarse estimate (spec
/// §4.8). This reconstructs an approximate variance from each worker's
/// `running_sd_est` rather than true per-round moments, since
/// `ChunkProgress` only carries summary estimates; acceptable because
/// progress snapshots are advisory only and never feed the final
/// `SimulationResult` (spec §9).
pub fn combine_progress(snapshots: &[ChunkProgress]) -> ChunkProgress {
    let rounds_done: u64 = snapshots.iter().map(|s| s.rounds_done).sum();
    let rounds_total: u64 = snapshots.iter().map(|s| s.rounds_total).sum();

    if rounds_done == 0 {
        return ChunkProgress {
            rounds_done: 0,
            rounds_total,
            running_ev_est: 0.0,
            running_sd_est: 0.0,
            running_avg_bet_est: 0.0,
        };
    }

    let mut ev_weighted = 0.0;
    let mut var_weighted = 0.0;
    let mut bet_weighted = 0.0;
    for s in snapshots {
        if s.rounds_done == 0 {
            continue;
        }
        let n = s.rounds_done as f64;
        let mean = s.running_ev_est / 100.0;
        let sd = s.running_sd_est / 10.0;
        ev_weighted += n * mean;
        var_weighted += n * sd * sd;
        bet_weighted += n * s.running_avg_bet_est;
    }
    let n_total = rounds_done as f64;
    let combined_mean = ev_weighted / n_total;
    let combined_variance = (var_weighted / n_total).max(0.0);

    ChunkProgress {
        rounds_done,
        rounds_total,
        running_ev_est: combined_mean * 100.0,
        running_sd_est: combined_variance.sqrt() * 10.0,
        running_avg_bet_est: bet_weighted / n_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::{RampStep, WongOutPolicy};

    fn flat_ramp() -> BetRamp {
        BetRamp {
            steps: vec![RampStep {
                tc_floor: -100,
                units: 1,
            }],
            wong_out_below_tc: None,
            wong_out_policy: WongOutPolicy::Anytime,
        }
    }

    #[test]
    fn split_rounds_differs_by_at_most_one() {
        let sizes = split_rounds(103, 8);
        assert_eq!(sizes.iter().sum::<u64>(), 103);
        let max = *sizes.iter().max().unwrap();
        let min = *sizes.iter().min().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn small_request_falls_back_to_one_inline_chunk() {
        let ramp = flat_ramp();
        let config = CoordinatorConfig {
            rules: GameRules::default(),
            counting_system: CountingSystem::default(),
            deviations: &[],
            ramp: &ramp,
            count_cfg: TcEstimationConfig::default(),
            target_rounds: 5000,
            master_seed: 1,
            worker_count: 8,
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let chunks = run_chunks(&config, &cancel).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].rounds, 5000);
    }

    #[test]
    fn large_request_splits_across_workers() {
        let ramp = flat_ramp();
        let config = CoordinatorConfig {
            rules: GameRules::default(),
            counting_system: CountingSystem::default(),
            deviations: &[],
            ramp: &ramp,
            count_cfg: TcEstimationConfig::default(),
            target_rounds: 400_000,
            master_seed: 1,
            worker_count: 4,
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let chunks = run_chunks(&config, &cancel).unwrap();
        assert_eq!(chunks.len(), 4);
        let total: u64 = chunks.iter().map(|c| c.rounds).sum();
        assert_eq!(total, 400_000);
    }

    #[test]
    fn determinism_across_repeated_runs_with_same_worker_count() {
        let ramp = flat_ramp();
        let config = CoordinatorConfig {
            rules: GameRules::default(),
            counting_system: CountingSystem::default(),
            deviations: &[],
            ramp: &ramp,
            count_cfg: TcEstimationConfig::default(),
            target_rounds: 200_000,
            master_seed: 55,
            worker_count: 4,
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let a = run_coordinated(&config, &cancel).unwrap();
        let b = run_coordinated(&config, &cancel).unwrap();
        assert_eq!(a.mean, b.mean);
        assert_eq!(a.variance, b.variance);
    }
}
