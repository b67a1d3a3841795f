use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregatedStats;
use crate::derive::{ConfidenceInterval, DerivedMetrics, TcTableRow, derive};

/// Run-lifecycle metadata carried alongside the derived metrics (spec
/// §6 response `meta`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultMeta {
    pub rounds_played: u64,
    pub was_cancelled: bool,
}

/// The full response contract (spec §6 `SimulationResult`). Built by
/// the aggregator/derivation layer once a run finishes or is stopped;
/// never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub rounds_played: u64,
    pub ev_per_100: f64,
    pub stdev_per_100: f64,
    pub variance_per_hand: f64,
    pub avg_initial_bet: f64,
    pub di: f64,
    pub score: f64,
    pub n0_hands: Option<f64>,
    pub hours_played: Option<f64>,
    pub ror: Option<f64>,
    pub ev_per_100_ci: ConfidenceInterval,
    pub stdev_per_100_ci: ConfidenceInterval,
    pub di_ci: ConfidenceInterval,
    pub score_ci: ConfidenceInterval,
    pub n0_ci: Option<ConfidenceInterval>,
    pub tc_histogram: BTreeMap<i32, u64>,
    pub tc_histogram_est: BTreeMap<i32, u64>,
    pub tc_table: Vec<TcTableRow>,
    pub meta: ResultMeta,
}

impl SimulationResult {
    /// Assembles the response from aggregated chunk stats plus the
    /// display-only knobs that gate `hours_played`/`ror` (spec §4.10,
    /// §6). `was_cancelled` reflects the coordinator's run status, not
    /// just whether any chunk reports it, since a run can be stopped
    /// after all chunks otherwise completed normally.
    pub fn from_aggregate(
        stats: &AggregatedStats,
        bankroll_units: Option<f64>,
        hands_per_hour: Option<f64>,
        was_cancelled: bool,
    ) -> Self {
        let metrics: DerivedMetrics = derive(stats, bankroll_units, hands_per_hour);
        Self {
            rounds_played: metrics.rounds_played,
            ev_per_100: metrics.ev_per_100,
            stdev_per_100: metrics.sd_per_100,
            variance_per_hand: metrics.variance_per_hand,
            avg_initial_bet: metrics.avg_initial_bet,
            di: metrics.di,
            score: metrics.score,
            n0_hands: metrics.n0_hands,
            hours_played: metrics.hours_played,
            ror: metrics.ror,
            ev_per_100_ci: metrics.ev_per_100_ci,
            stdev_per_100_ci: metrics.sd_per_100_ci,
            di_ci: metrics.di_ci,
            score_ci: metrics.score_ci,
            n0_ci: metrics.n0_ci,
            tc_histogram: stats.tc_histogram_raw.clone(),
            tc_histogram_est: stats.tc_histogram_est.clone(),
            tc_table: metrics.tc_table,
            meta: ResultMeta {
                rounds_played: stats.n,
                was_cancelled,
            },
        }
    }
}
