use serde::{Deserialize, Serialize};

use crate::aggregate::AggregatedStats;
use crate::bet::BetRamp;

/// 95% two-sided normal z-score, used throughout for confidence
/// intervals (spec §4.10).
const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
}

/// One row of the per-true-count edge table (spec §6 response
/// `tc_table`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TcTableRow {
    pub tc: i32,
    pub n: u64,
    pub n_iba: u64,
    pub n_zero: u64,
    pub freq: f64,
    pub ev_pct: f64,
    pub ev_se_pct: f64,
    pub variance: f64,
}

/// Fully derived statistics computed from aggregated moments (spec
/// §4.10). All monetary fields are in bet units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub rounds_played: u64,
    pub ev_per_100: f64,
    pub sd_per_100: f64,
    pub variance_per_hand: f64,
    pub avg_initial_bet: f64,
    pub di: f64,
    pub score: f64,
    /// `None` encodes the spec's "∞ when M = 0".
    pub n0_hands: Option<f64>,
    pub hours_played: Option<f64>,
    pub ror: Option<f64>,
    pub ev_per_100_ci: ConfidenceInterval,
    pub sd_per_100_ci: ConfidenceInterval,
    pub di_ci: ConfidenceInterval,
    pub score_ci: ConfidenceInterval,
    /// `None` whenever the point estimate is (the mean's CI straddles
    /// zero, same convention as `n0_hands`).
    pub n0_ci: Option<ConfidenceInterval>,
    pub tc_table: Vec<TcTableRow>,
}

fn se_mean(variance: f64, n: u64) -> f64 {
    if n == 0 {
        0.0
    } else {
        (variance / n as f64).sqrt()
    }
}

fn se_sd(variance: f64, n: u64) -> f64 {
    if n == 0 {
        0.0
    } else {
        variance.sqrt() / (2.0 * n as f64).sqrt()
    }
}

/// Builds the per-TC edge table from aggregated bucket accumulators.
fn build_tc_table(stats: &AggregatedStats) -> Vec<TcTableRow> {
    let total_n: u64 = stats.per_bucket.values().map(|b| b.n_total).sum();
    stats
        .per_bucket
        .iter()
        .map(|(&tc, acc)| {
            let variance = acc.variance().unwrap_or(0.0);
            let ev_pct = acc.mean().unwrap_or(0.0) * 100.0;
            let ev_se_pct = if acc.n_iba > 0 {
                (variance / acc.n_iba as f64).sqrt() * 100.0
            } else {
                0.0
            };
            TcTableRow {
                tc,
                n: acc.n_total,
                n_iba: acc.n_iba,
                n_zero: acc.n_total - acc.n_iba,
                freq: if total_n > 0 {
                    acc.n_total as f64 / total_n as f64
                } else {
                    0.0
                },
                ev_pct,
                ev_se_pct,
                variance,
            }
        })
        .collect()
}

/// Computes every derived metric from the aggregator's output (spec
/// §4.10). `bankroll_units` gates RoR (`None` ⇒ RoR is undefined);
/// `hands_per_hour` gates `hours_played` (display-only, per spec §6).
pub fn derive(
    stats: &AggregatedStats,
    bankroll_units: Option<f64>,
    hands_per_hour: Option<f64>,
) -> DerivedMetrics {
    let n = stats.n;
    let m = stats.mean;
    let v = stats.variance;

    let ev_per_100 = 100.0 * m;
    let sd_per_100 = 10.0 * v.sqrt();
    let di = if v == 0.0 { 0.0 } else { m / v.sqrt() };
    let score = if v == 0.0 { 0.0 } else { 100.0 * m * m / v };
    let n0_hands = if m == 0.0 { None } else { Some(v / (m * m)) };

    let se_m = se_mean(v, n);
    let se_sqrt_v = se_sd(v, n);
    let ev_per_100_ci = ConfidenceInterval {
        low: (m - Z_95 * se_m) * 100.0,
        high: (m + Z_95 * se_m) * 100.0,
    };
    let sd_per_100_ci = ConfidenceInterval {
        low: (v.sqrt() - Z_95 * se_sqrt_v).max(0.0) * 10.0,
        high: (v.sqrt() + Z_95 * se_sqrt_v) * 10.0,
    };

    // Envelope method (spec §4.10): bound DI/Score/N0 by evaluating each
    // at the opposing corners of the mean/variance confidence box, then
    // sorting the two corners so `low <= high` even where the envelope
    // isn't strictly monotonic (e.g. the mean's CI straddles zero).
    let m_low = m - Z_95 * se_m;
    let m_high = m + Z_95 * se_m;
    let sd_low = (v.sqrt() - Z_95 * se_sqrt_v).max(0.0);
    let sd_high = v.sqrt() + Z_95 * se_sqrt_v;
    let v_low = sd_low * sd_low;
    let v_high = sd_high * sd_high;

    let di_at = |mean: f64, var: f64| if var == 0.0 { 0.0 } else { mean / var.sqrt() };
    let score_at = |mean: f64, var: f64| if var == 0.0 { 0.0 } else { 100.0 * mean * mean / var };

    let di_corner_a = di_at(m_low, v_high);
    let di_corner_b = di_at(m_high, v_low);
    let di_ci = ConfidenceInterval {
        low: di_corner_a.min(di_corner_b),
        high: di_corner_a.max(di_corner_b),
    };

    let score_corner_a = score_at(m_low, v_high);
    let score_corner_b = score_at(m_high, v_low);
    let score_ci = ConfidenceInterval {
        low: score_corner_a.min(score_corner_b),
        high: score_corner_a.max(score_corner_b),
    };

    let n0_ci = if m_low == 0.0 || m_high == 0.0 {
        None
    } else {
        let n0_corner_a = v_low / (m_high * m_high);
        let n0_corner_b = v_high / (m_low * m_low);
        Some(ConfidenceInterval {
            low: n0_corner_a.min(n0_corner_b),
            high: n0_corner_a.max(n0_corner_b),
        })
    };

    let ror = bankroll_units.map(|bankroll| lifetime_ror(m, v, bankroll));
    let hours_played = hands_per_hour
        .filter(|&hph| hph > 0.0)
        .map(|hph| n as f64 / hph);

    DerivedMetrics {
        rounds_played: n,
        ev_per_100,
        sd_per_100,
        variance_per_hand: v,
        avg_initial_bet: stats.avg_bet,
        di,
        score,
        n0_hands,
        hours_played,
        ror,
        ev_per_100_ci,
        sd_per_100_ci,
        di_ci,
        score_ci,
        n0_ci,
        tc_table: build_tc_table(stats),
    }
}

/// Lifetime risk of ruin (spec §4.10): `exp(-2MB/V)` when `M > 0`; `1`
/// when `M <= 0`; `0` when `V = 0` (and `M > 0`, an edge with no
/// variance can never lose).
pub fn lifetime_ror(mean: f64, variance: f64, bankroll_units: f64) -> f64 {
    if mean <= 0.0 {
        return 1.0;
    }
    if variance == 0.0 {
        return 0.0;
    }
    (-2.0 * mean * bankroll_units / variance).exp()
}

/// Finite-trip risk of ruin over `rounds` rounds via a normal
/// approximation (spec §4.10):
/// `RoR = Φ(z1) + exp(-2MB/V)·Φ(z2)`,
/// `z1 = (-B - M·T)/(σ√T)`, `z2 = (-B + M·T)/(σ√T)`.
pub fn finite_trip_ror(mean: f64, variance: f64, bankroll_units: f64, rounds: f64) -> f64 {
    if variance <= 0.0 || rounds <= 0.0 {
        return if mean <= 0.0 { 1.0 } else { 0.0 };
    }
    let sigma = variance.sqrt();
    let z1 = (-bankroll_units - mean * rounds) / (sigma * rounds.sqrt());
    let z2 = (-bankroll_units + mean * rounds) / (sigma * rounds.sqrt());
    let ror = standard_normal_cdf(z1) + (-2.0 * mean * bankroll_units / variance).exp() * standard_normal_cdf(z2);
    ror.clamp(0.0, 1.0)
}

/// Bankroll required to achieve a target lifetime RoR `p ∈ (0,1)` (spec
/// §4.10): `B(p) = -ln(p)·V / (2M)`. Requires `M > 0, V > 0`.
pub fn required_bankroll(mean: f64, variance: f64, target_ror: f64) -> Option<f64> {
    if mean <= 0.0 || variance <= 0.0 || !(0.0..1.0).contains(&target_ror) || target_ror <= 0.0 {
        return None;
    }
    Some(-target_ror.ln() * variance / (2.0 * mean))
}

/// Policy applied to a bucket's advisory Kelly bet when its edge is not
/// positive (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegativeEdgePolicy {
    SitOut,
    ForceMinBet,
    Hide,
}

/// One row of the advisory per-TC Kelly bet table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyRow {
    pub tc: i32,
    /// `None` under `NegativeEdgePolicy::Hide`.
    pub units: Option<f64>,
}

/// Advisory optimal (fractional Kelly) bet per TC bucket (spec §4.10).
/// Enforces the ramp's minimum unit and monotonic non-decrease in TC
/// ("simplify" policy, spec §8 property 8).
pub fn kelly_table(
    stats: &AggregatedStats,
    bankroll_units: f64,
    kelly_fraction: f64,
    max_units: f64,
    ramp: &BetRamp,
    negative_edge_policy: NegativeEdgePolicy,
) -> Vec<KellyRow> {
    let min_unit = ramp.steps.iter().map(|s| s.units).min().unwrap_or(0) as f64;

    let mut raw: Vec<(i32, Option<f64>)> = stats
        .per_bucket
        .iter()
        .map(|(&tc, acc)| {
            let mean = acc.mean().unwrap_or(0.0);
            let variance = acc.variance().unwrap_or(0.0);
            if acc.n_iba == 0 || mean <= 0.0 || variance <= 0.0 {
                let units = match negative_edge_policy {
                    NegativeEdgePolicy::SitOut => Some(0.0),
                    NegativeEdgePolicy::ForceMinBet => Some(min_unit),
                    NegativeEdgePolicy::Hide => None,
                };
                return (tc, units);
            }
            let exact = bankroll_units * kelly_fraction * mean / variance;
            let clamped = exact.max(min_unit).min(max_units);
            (tc, Some(clamped))
        })
        .collect();

    raw.sort_by_key(|&(tc, _)| tc);
    let mut running_max = 0.0_f64;
    for (_, units) in raw.iter_mut() {
        if let Some(u) = units {
            if *u < running_max {
                *u = running_max;
            }
            running_max = *u;
        }
    }
    raw.into_iter().map(|(tc, units)| KellyRow { tc, units }).collect()
}

/// Standard normal CDF via the Abramowitz–Stegun erf approximation
/// (max error ~1.5e-7), sufficient for the risk-of-ruin normal
/// approximation above.
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::aggregate::{ChunkStats, aggregate};
    use crate::bet::{RampStep, WongOutPolicy};
    use crate::round::RoundObservation;
    use std::collections::BTreeMap;

    fn stats_with(n: u64, mean: f64, variance: f64, avg_bet: f64) -> AggregatedStats {
        AggregatedStats {
            n,
            mean,
            variance,
            avg_bet,
            tc_histogram_raw: BTreeMap::new(),
            tc_histogram_est: BTreeMap::new(),
            per_bucket: BTreeMap::new(),
            was_cancelled: false,
        }
    }

    #[test]
    fn house_edge_sanity_matches_known_scale() {
        // Roughly S1 scale: mean -0.005/round, sd ~1.13/round.
        let stats = stats_with(2_000_000, -0.005, 1.13f64.powi(2), 1.0);
        let metrics = derive(&stats, None, None);
        assert_relative_eq!(metrics.ev_per_100, -0.5, epsilon = 0.01);
        assert_relative_eq!(metrics.sd_per_100, 11.3, epsilon = 0.1);
    }

    #[test]
    fn zero_variance_clamps_di_and_score_to_zero() {
        let stats = stats_with(100, 0.1, 0.0, 1.0);
        let metrics = derive(&stats, None, None);
        assert_eq!(metrics.di, 0.0);
        assert_eq!(metrics.score, 0.0);
    }

    #[test]
    fn zero_mean_yields_no_n0() {
        let stats = stats_with(100, 0.0, 1.0, 1.0);
        let metrics = derive(&stats, None, None);
        assert_eq!(metrics.n0_hands, None);
    }

    #[test]
    fn di_and_score_ci_widen_as_sample_size_shrinks() {
        let small_n = derive(&stats_with(1_000, 0.01, 1.0, 1.0), None, None);
        let large_n = derive(&stats_with(1_000_000, 0.01, 1.0, 1.0), None, None);
        let small_width = small_n.di_ci.high - small_n.di_ci.low;
        let large_width = large_n.di_ci.high - large_n.di_ci.low;
        assert!(small_width > large_width);

        let small_score_width = small_n.score_ci.high - small_n.score_ci.low;
        let large_score_width = large_n.score_ci.high - large_n.score_ci.low;
        assert!(small_score_width > large_score_width);
    }

    #[test]
    fn n0_ci_is_none_when_mean_ci_straddles_zero() {
        let stats = stats_with(100, 0.001, 1.0, 1.0);
        let metrics = derive(&stats, None, None);
        assert!(metrics.ev_per_100_ci.low < 0.0 && metrics.ev_per_100_ci.high > 0.0);
        assert_eq!(metrics.n0_ci, None);
    }

    #[test]
    fn n0_ci_is_present_and_well_ordered_for_a_clear_edge() {
        let stats = stats_with(2_000_000, 0.01, 1.0, 1.0);
        let metrics = derive(&stats, None, None);
        let ci = metrics.n0_ci.expect("mean CI should not straddle zero at this scale");
        assert!(ci.low <= ci.high);
    }

    #[test]
    fn bankroll_null_yields_no_ror_but_other_fields_present() {
        let stats = stats_with(100, 0.01, 1.0, 1.0);
        let metrics = derive(&stats, None, None);
        assert_eq!(metrics.ror, None);
        assert!(metrics.ev_per_100 != 0.0);
    }

    #[test]
    fn lifetime_ror_is_one_when_mean_non_positive() {
        assert_eq!(lifetime_ror(0.0, 1.0, 100.0), 1.0);
        assert_eq!(lifetime_ror(-0.1, 1.0, 100.0), 1.0);
    }

    #[test]
    fn lifetime_ror_decreases_with_larger_bankroll() {
        let small = lifetime_ror(0.01, 1.0, 50.0);
        let large = lifetime_ror(0.01, 1.0, 500.0);
        assert!(large < small);
        assert!(small > 0.0 && small < 1.0);
    }

    #[test]
    fn required_bankroll_round_trips_into_target_ror() {
        let mean = 0.01;
        let variance = 1.2;
        let target = 0.05;
        let bankroll = required_bankroll(mean, variance, target).unwrap();
        let ror = lifetime_ror(mean, variance, bankroll);
        assert_relative_eq!(ror, target, epsilon = 1e-9);
    }

    #[test]
    fn kelly_table_is_monotonically_non_decreasing_in_tc() {
        let mut chunk = ChunkStats::new();
        for (tc, profit) in [(-2, -1.0), (0, 0.0), (3, 1.0), (6, 5.0)] {
            for _ in 0..200 {
                let obs = RoundObservation {
                    initial_bet_units: 1,
                    total_profit_units: profit,
                    running_count_at_bet: 0,
                    true_count_at_bet: tc as f64,
                    bucket: tc,
                    was_iba: true,
                };
                chunk.observe(&obs, tc, tc);
            }
            // vary profit slightly so variance is nonzero
            let obs2 = RoundObservation {
                initial_bet_units: 1,
                total_profit_units: profit + 0.5,
                running_count_at_bet: 0,
                true_count_at_bet: tc as f64,
                bucket: tc,
                was_iba: true,
            };
            chunk.observe(&obs2, tc, tc);
        }
        let stats = aggregate(&[chunk]);
        let ramp = BetRamp {
            steps: vec![RampStep { tc_floor: -100, units: 1 }],
            wong_out_below_tc: None,
            wong_out_policy: WongOutPolicy::Anytime,
        };
        let table = kelly_table(&stats, 1000.0, 0.5, 100.0, &ramp, NegativeEdgePolicy::SitOut);
        let mut prev = 0.0_f64;
        for row in &table {
            let u = row.units.unwrap();
            assert!(u >= prev - 1e-9);
            prev = u;
        }
    }

}
