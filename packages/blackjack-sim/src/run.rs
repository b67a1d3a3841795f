use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::aggregate::aggregate;
use crate::chunk::ChunkProgress;
use crate::coordinator::{CoordinatorConfig, combine_progress, run_chunks_with_progress};
use crate::error::SimError;
use crate::request::SimulationRequest;
use crate::response::SimulationResult;

/// Opaque handle returned by [`Runs::start`] (spec §6 `run_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunHandle(u64);

/// Lifecycle status of a run (spec §4.(RunHandle)). Transitions are
/// monotonic except `Running -> Stopped`, which is externally triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Stopped,
    Error,
}

/// A point-in-time view of a run's progress (spec §6 `status`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub status: RunStatus,
    pub progress: f64,
    pub hands_done: u64,
    pub hands_total: u64,
    pub ev_per_100_est: f64,
    pub stdev_per_100_est: f64,
    pub avg_initial_bet_est: f64,
}

struct RunState {
    status: RunStatus,
    progress_slots: Arc<Vec<Mutex<ChunkProgress>>>,
    hands_total: u64,
    result: Option<SimulationResult>,
    error: Option<SimError>,
}

struct RunEntry {
    cancel: Arc<AtomicBool>,
    state: Mutex<RunState>,
}

/// The run registry: owns every run's cancellation flag and shared
/// progress state, and hands out opaque [`RunHandle`]s to callers (spec
/// §6 run control surface). A transport layer typically owns one
/// `Runs` for the process lifetime.
pub struct Runs {
    next_id: AtomicU64,
    entries: Mutex<HashMap<RunHandle, Arc<RunEntry>>>,
}

impl Runs {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Validates the request, then spawns the coordinated simulation on
    /// a background thread and returns immediately with a handle (spec
    /// §6 `start`). Validation failures are reported synchronously and
    /// never produce a run.
    pub fn start(&self, request: SimulationRequest) -> Result<RunHandle, SimError> {
        request.validate()?;

        let worker_count = request.settings.effective_worker_count();
        let hands_total = request.settings.hands;
        let handle = RunHandle(self.next_id.fetch_add(1, Ordering::Relaxed));

        let cancel = Arc::new(AtomicBool::new(false));
        let progress_slots = Arc::new(
            (0..worker_count.max(1))
                .map(|_| {
                    Mutex::new(ChunkProgress {
                        rounds_done: 0,
                        rounds_total: 0,
                        running_ev_est: 0.0,
                        running_sd_est: 0.0,
                        running_avg_bet_est: 0.0,
                    })
                })
                .collect(),
        );

        let entry = Arc::new(RunEntry {
            cancel: Arc::clone(&cancel),
            state: Mutex::new(RunState {
                status: RunStatus::Pending,
                progress_slots: Arc::clone(&progress_slots),
                hands_total,
                result: None,
                error: None,
            }),
        });

        self.entries
            .lock()
            .unwrap()
            .insert(handle, Arc::clone(&entry));

        let bankroll = request.settings.bankroll;
        let hands_per_hour = request.settings.hands_per_hour;

        log::info!(
            "run {:?} started: {hands_total} rounds requested across {worker_count} worker(s)",
            handle
        );

        thread::spawn(move || {
            entry.state.lock().unwrap().status = RunStatus::Running;

            let config = CoordinatorConfig {
                rules: request.rules,
                counting_system: request.counting_system,
                deviations: &request.deviations,
                ramp: &request.bet_ramp,
                count_cfg: request.settings.count_cfg(),
                target_rounds: hands_total,
                master_seed: request.settings.seed,
                worker_count,
            };

            let outcome = run_chunks_with_progress(&config, &cancel, Some(progress_slots));

            let mut state = entry.state.lock().unwrap();
            match outcome {
                Ok(chunks) => {
                    let was_cancelled =
                        cancel.load(Ordering::Relaxed) || chunks.iter().any(|c| c.was_cancelled);
                    let stats = aggregate(&chunks);
                    let result =
                        SimulationResult::from_aggregate(&stats, bankroll, hands_per_hour, was_cancelled);
                    log::info!(
                        "run {:?} {}: {} rounds played",
                        handle,
                        if was_cancelled { "stopped" } else { "finished" },
                        stats.n
                    );
                    state.result = Some(result);
                    state.status = if was_cancelled {
                        RunStatus::Stopped
                    } else {
                        RunStatus::Done
                    };
                }
                Err(err) => {
                    log::error!("run {:?} failed: {err}", handle);
                    state.error = Some(err);
                    state.status = RunStatus::Error;
                }
            }
        });

        Ok(handle)
    }

    /// Returns a live progress snapshot (spec §6 `status`). Never
    /// blocks; reads whatever the background thread has most recently
    /// published.
    pub fn status(&self, handle: RunHandle) -> Result<StatusSnapshot, SimError> {
        let entry = self.lookup(handle)?;
        let state = entry.state.lock().unwrap();

        let snapshots: Vec<ChunkProgress> = state
            .progress_slots
            .iter()
            .map(|slot| *slot.lock().unwrap())
            .collect();
        let combined = combine_progress(&snapshots);

        let hands_total = if combined.rounds_total > 0 {
            combined.rounds_total
        } else {
            state.hands_total
        };
        let progress = if hands_total == 0 {
            0.0
        } else {
            (combined.rounds_done as f64 / hands_total as f64).min(1.0)
        };

        Ok(StatusSnapshot {
            status: state.status,
            progress,
            hands_done: combined.rounds_done,
            hands_total,
            ev_per_100_est: combined.running_ev_est,
            stdev_per_100_est: combined.running_sd_est,
            avg_initial_bet_est: combined.running_avg_bet_est,
        })
    }

    /// Returns the final result if the run has finished (`Done` or
    /// `Stopped`), `None` while still pending/running, or the stored
    /// error if the run failed (spec §6 `get`).
    pub fn get(&self, handle: RunHandle) -> Result<Option<SimulationResult>, SimError> {
        let entry = self.lookup(handle)?;
        let state = entry.state.lock().unwrap();
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        Ok(state.result.clone())
    }

    /// Requests cancellation (spec §6 `stop`). Returns `true` if the run
    /// existed and was not already finished; the run still completes
    /// its in-flight round before transitioning to `Stopped`.
    pub fn stop(&self, handle: RunHandle) -> Result<bool, SimError> {
        let entry = self.lookup(handle)?;
        let already_finished = {
            let state = entry.state.lock().unwrap();
            matches!(
                state.status,
                RunStatus::Done | RunStatus::Stopped | RunStatus::Error
            )
        };
        entry.cancel.store(true, Ordering::Relaxed);
        log::info!(
            "run {:?} cancellation requested (already finished: {already_finished})",
            handle
        );
        Ok(!already_finished)
    }

    fn lookup(&self, handle: RunHandle) -> Result<Arc<RunEntry>, SimError> {
        self.entries
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .ok_or(SimError::RunNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::{BetRamp, RampStep, WongOutPolicy};
    use crate::counter::{CountingSystem, RoundingMode, TcStep};
    use crate::request::Settings;
    use crate::rules::GameRules;
    use std::time::{Duration, Instant};

    fn flat_request(hands: u64) -> SimulationRequest {
        SimulationRequest {
            rules: GameRules::default(),
            counting_system: CountingSystem::default(),
            deviations: vec![],
            bet_ramp: BetRamp {
                steps: vec![RampStep {
                    tc_floor: -100,
                    units: 1,
                }],
                wong_out_below_tc: None,
                wong_out_policy: WongOutPolicy::Anytime,
            },
            settings: Settings {
                hands,
                seed: 7,
                unit_size: 25.0,
                bankroll: Some(1000.0),
                hands_per_hour: Some(80.0),
                deck_estimation_step: TcStep::HalfDeck,
                deck_estimation_rounding: RoundingMode::Nearest,
                use_estimated_tc_for_bet: false,
                use_estimated_tc_for_deviations: false,
                use_multiprocessing: false,
                worker_count: 1,
            },
        }
    }

    fn wait_for_finish(runs: &Runs, handle: RunHandle) -> SimulationResult {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            if let Some(result) = runs.get(handle).unwrap() {
                return result;
            }
            assert!(Instant::now() < deadline, "run did not finish in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn start_then_get_returns_none_until_done_then_some() {
        let runs = Runs::new();
        let handle = runs.start(flat_request(5_000)).unwrap();
        let result = wait_for_finish(&runs, handle);
        assert_eq!(result.rounds_played, 5_000);
        assert!(!result.meta.was_cancelled);
    }

    #[test]
    fn status_reports_monotonic_progress_towards_completion() {
        let runs = Runs::new();
        let handle = runs.start(flat_request(5_000)).unwrap();
        wait_for_finish(&runs, handle);
        let status = runs.status(handle).unwrap();
        assert_eq!(status.status, RunStatus::Done);
        assert!((status.progress - 1.0).abs() < 1e-9);
        assert_eq!(status.hands_done, 5_000);
    }

    #[test]
    fn stop_marks_run_stopped_and_result_reflects_cancellation() {
        let runs = Runs::new();
        let handle = runs.start(flat_request(500_000)).unwrap();
        let stopped_now = runs.stop(handle).unwrap();
        assert!(stopped_now);
        let result = wait_for_finish(&runs, handle);
        assert!(result.meta.was_cancelled);
        assert_eq!(runs.status(handle).unwrap().status, RunStatus::Stopped);
    }

    #[test]
    fn unknown_handle_is_reported_as_run_not_found() {
        let runs = Runs::new();
        let bogus = RunHandle(999_999);
        assert_eq!(runs.status(bogus).unwrap_err(), SimError::RunNotFound);
        assert_eq!(runs.get(bogus).unwrap_err(), SimError::RunNotFound);
        assert_eq!(runs.stop(bogus).unwrap_err(), SimError::RunNotFound);
    }

    #[test]
    fn invalid_request_is_rejected_synchronously_without_creating_a_run() {
        let runs = Runs::new();
        let mut request = flat_request(0);
        request.settings.hands = 0;
        let err = runs.start(request).unwrap_err();
        assert!(matches!(err, SimError::InvalidRequest(_)));
    }
}
