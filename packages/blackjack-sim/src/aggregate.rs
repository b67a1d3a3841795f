use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::round::RoundObservation;

/// Per-bucket accumulator over IBA (initial-bet-active) rounds only
/// (spec §3 `BucketAcc`, §4.6: "the edge is undefined when initial bet
/// is 0").
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketAcc {
    pub n_total: u64,
    pub n_iba: u64,
    pub profit_sum_iba: f64,
    pub profit_sq_sum_iba: f64,
}

impl BucketAcc {
    fn observe(&mut self, obs: &RoundObservation) {
        self.n_total += 1;
        if obs.was_iba {
            self.n_iba += 1;
            self.profit_sum_iba += obs.total_profit_units;
            self.profit_sq_sum_iba += obs.total_profit_units * obs.total_profit_units;
        }
    }

    fn merge(&mut self, other: &BucketAcc) {
        self.n_total += other.n_total;
        self.n_iba += other.n_iba;
        self.profit_sum_iba += other.profit_sum_iba;
        self.profit_sq_sum_iba += other.profit_sq_sum_iba;
    }

    /// Mean profit per IBA round in this bucket, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.n_iba == 0 {
            None
        } else {
            Some(self.profit_sum_iba / self.n_iba as f64)
        }
    }

    /// Population variance (divide by n, not n-1): spec §9 resolves the
    /// open question in favor of the source's population convention.
    pub fn variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        Some((self.profit_sq_sum_iba / self.n_iba as f64 - mean * mean).max(0.0))
    }
}

/// One worker's complete output over its share of the requested rounds
/// (spec §3 `ChunkStats`). Moved, never shared, from worker to
/// aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkStats {
    pub rounds: u64,
    pub profit_sum: f64,
    pub profit_sq_sum: f64,
    pub bet_sum: f64,
    pub tc_histogram_raw: BTreeMap<i32, u64>,
    pub tc_histogram_est: BTreeMap<i32, u64>,
    pub per_bucket: BTreeMap<i32, BucketAcc>,
    pub was_cancelled: bool,
}

impl ChunkStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one round's observation into the running accumulators
    /// (spec §4.7). `raw_bucket`/`est_bucket` are the floored exact and
    /// estimated TC buckets respectively; `per_bucket` is always keyed by
    /// the observation's own bucket (derived from exact TC, per §4.6).
    pub fn observe(&mut self, obs: &RoundObservation, raw_bucket: i32, est_bucket: i32) {
        self.rounds += 1;
        self.profit_sum += obs.total_profit_units;
        self.profit_sq_sum += obs.total_profit_units * obs.total_profit_units;
        self.bet_sum += obs.initial_bet_units as f64;
        *self.tc_histogram_raw.entry(raw_bucket).or_insert(0) += 1;
        *self.tc_histogram_est.entry(est_bucket).or_insert(0) += 1;
        self.per_bucket.entry(obs.bucket).or_default().observe(obs);
    }

    pub fn mean(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.profit_sum / self.rounds as f64
        }
    }

    /// Population variance of per-round profit.
    pub fn variance(&self) -> f64 {
        if self.rounds == 0 {
            return 0.0;
        }
        let m = self.mean();
        (self.profit_sq_sum / self.rounds as f64 - m * m).max(0.0)
    }

    pub fn avg_bet(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.bet_sum / self.rounds as f64
        }
    }
}

/// Combined moments plus merged histograms/buckets produced by
/// [`aggregate`] (spec §4.9).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedStats {
    pub n: u64,
    pub mean: f64,
    pub variance: f64,
    pub avg_bet: f64,
    pub tc_histogram_raw: BTreeMap<i32, u64>,
    pub tc_histogram_est: BTreeMap<i32, u64>,
    pub per_bucket: BTreeMap<i32, BucketAcc>,
    pub was_cancelled: bool,
}

/// Combines independent chunks via the parallel-variance identity (spec
/// §4.9):
/// `N = Σn_i`, `M = Σ(n_i·m_i)/N`, `V = Σ(n_i·(v_i + (m_i−M)²))/N`.
/// `N = 0` returns an all-zero, n/a-flagged result; negative round-off
/// variance is clamped to zero.
pub fn aggregate(chunks: &[ChunkStats]) -> AggregatedStats {
    let n: u64 = chunks.iter().map(|c| c.rounds).sum();
    if n == 0 {
        return AggregatedStats {
            n: 0,
            mean: 0.0,
            variance: 0.0,
            avg_bet: 0.0,
            tc_histogram_raw: BTreeMap::new(),
            tc_histogram_est: BTreeMap::new(),
            per_bucket: BTreeMap::new(),
            was_cancelled: chunks.iter().any(|c| c.was_cancelled),
        };
    }

    let n_f = n as f64;
    let mean: f64 = chunks
        .iter()
        .map(|c| c.rounds as f64 * c.mean())
        .sum::<f64>()
        / n_f;

    let variance: f64 = chunks
        .iter()
        .map(|c| {
            let m_i = c.mean();
            c.rounds as f64 * (c.variance() + (m_i - mean) * (m_i - mean))
        })
        .sum::<f64>()
        / n_f;
    let variance = variance.max(0.0);

    let avg_bet: f64 = chunks
        .iter()
        .map(|c| c.rounds as f64 * c.avg_bet())
        .sum::<f64>()
        / n_f;

    let mut tc_histogram_raw = BTreeMap::new();
    let mut tc_histogram_est = BTreeMap::new();
    let mut per_bucket: BTreeMap<i32, BucketAcc> = BTreeMap::new();
    for chunk in chunks {
        for (&k, &v) in &chunk.tc_histogram_raw {
            *tc_histogram_raw.entry(k).or_insert(0) += v;
        }
        for (&k, &v) in &chunk.tc_histogram_est {
            *tc_histogram_est.entry(k).or_insert(0) += v;
        }
        for (&k, acc) in &chunk.per_bucket {
            per_bucket.entry(k).or_default().merge(acc);
        }
    }

    AggregatedStats {
        n,
        mean,
        variance,
        avg_bet,
        tc_histogram_raw,
        tc_histogram_est,
        per_bucket,
        was_cancelled: chunks.iter().any(|c| c.was_cancelled),
    }
}
