//! Mantel test: correlation between two distance matrices over the same items,
//! with significance from joint row/column relabelling of one matrix.
//!
//! Trial 0 of the null distribution is always the identity permutation, so
//! the observed statistic counts toward its own p-value and `p >= 1/perms`.
//! Runs without a seed draw from OS entropy and are not reproducible; pass a
//! seed (or an explicit RNG) for repeatable results.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::error::{CompositionalityError, Result};
use crate::matrix::{items_for_condensed_len, DistanceMatrix};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Permutation orders generated per batch before their statistics are
/// evaluated.
const PERMUTATION_CHUNK: usize = 1024;

/// Correlation coefficient used for the statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    /// Pearson over average ranks.
    Spearman,
}

/// Which side of the null distribution counts as extreme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tail {
    /// Null statistics `>=` observed.
    #[default]
    Upper,
    /// Null statistics `<=` observed.
    Lower,
    /// `|null| >= |observed|`.
    TwoSided,
}

/// Unrecognised method or tail name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseOptionError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl FromStr for CorrelationMethod {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pearson" => Ok(Self::Pearson),
            "spearman" => Ok(Self::Spearman),
            _ => Err(ParseOptionError {
                kind: "correlation method",
                value: s.to_string(),
                expected: "pearson, spearman",
            }),
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pearson => "pearson",
            Self::Spearman => "spearman",
        })
    }
}

impl FromStr for Tail {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            "two-sided" | "two_sided" | "two-tail" | "two" => Ok(Self::TwoSided),
            _ => Err(ParseOptionError {
                kind: "tail",
                value: s.to_string(),
                expected: "upper, lower, two-sided",
            }),
        }
    }
}

impl fmt::Display for Tail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upper => "upper",
            Self::Lower => "lower",
            Self::TwoSided => "two-sided",
        })
    }
}

/// Parameters of one Mantel test.
#[derive(Debug, Clone, Copy)]
pub struct MantelConfig {
    pub method: CorrelationMethod,
    pub tail: Tail,
    /// Total trials including the identity.
    pub permutations: usize,
    /// Seed for the permutation stream; `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Evaluate permutation statistics on a worker pool (`parallel` feature).
    pub use_threads: bool,
    pub max_workers: usize,
}

impl Default for MantelConfig {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::Pearson,
            tail: Tail::Upper,
            permutations: 10_000,
            seed: None,
            use_threads: false,
            max_workers: 1,
        }
    }
}

/// Outcome of a Mantel test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MantelResult {
    /// Observed correlation coefficient.
    pub correlation: f64,
    pub p_value: f64,
    /// Standard score of the observed statistic against the null
    /// distribution (population standard deviation).
    pub z_score: f64,
    pub permutations: usize,
    pub method: CorrelationMethod,
    pub tail: Tail,
}

impl fmt::Display for MantelResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r={} p={} z={}",
            self.correlation, self.p_value, self.z_score
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MantelTest {
    config: MantelConfig,
}

impl MantelTest {
    pub fn new(config: MantelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MantelConfig {
        &self.config
    }

    /// Run on two upper-triangle vectors using the configured seed.
    pub fn run(&self, x: &[f64], y: &[f64]) -> Result<MantelResult> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.run_with_rng(x, y, &mut rng)
    }

    /// Run on two distance matrices over the same items.
    pub fn run_matrices(&self, x: &DistanceMatrix, y: &DistanceMatrix) -> Result<MantelResult> {
        self.run(x.upper_triangle(), y.upper_triangle())
    }

    /// Run with an explicit random source. Permutation orders are drawn from
    /// `rng` strictly in trial order, whether or not statistics are evaluated
    /// in parallel.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        x: &[f64],
        y: &[f64],
        rng: &mut R,
    ) -> Result<MantelResult> {
        let MantelConfig {
            method,
            tail,
            permutations,
            ..
        } = self.config;

        if permutations == 0 {
            return Err(CompositionalityError::InvalidPermutations);
        }
        let n = implied_items(x, y)?;
        if n < 3 {
            return Err(CompositionalityError::InsufficientData { items: n });
        }

        let (x, y) = match method {
            CorrelationMethod::Pearson => (x.to_vec(), y.to_vec()),
            CorrelationMethod::Spearman => (average_ranks(x), average_ranks(y)),
        };

        let (x_res, sxx) = residuals(&x);
        let (y_res, syy) = residuals(&y);
        if sxx == 0.0 {
            return Err(CompositionalityError::ConstantVector { which: "first" });
        }
        if syy == 0.0 {
            return Err(CompositionalityError::ConstantVector { which: "second" });
        }
        let denominator = (sxx * syy).sqrt();
        let y_matrix = DistanceMatrix::from_condensed(n, y_res)?;

        let identity: Vec<usize> = (0..n).collect();
        let observed = permuted_correlation(&x_res, &y_matrix, &identity, denominator);
        debug!("Observed {method} correlation {observed} over {n} items");

        let mut null = Vec::with_capacity(permutations);
        null.push(observed);

        let pool = self.worker_pool();
        let mut remaining = permutations - 1;
        while remaining > 0 {
            let batch = remaining.min(PERMUTATION_CHUNK);
            let orders: Vec<Vec<usize>> = (0..batch)
                .map(|_| {
                    let mut order = identity.clone();
                    order.shuffle(&mut *rng);
                    order
                })
                .collect();
            let evaluate =
                |order: &Vec<usize>| permuted_correlation(&x_res, &y_matrix, order, denominator);
            null.extend(evaluate_batch(&pool, &orders, evaluate));
            remaining -= batch;
        }

        let extreme = null
            .iter()
            .filter(|&&stat| match tail {
                Tail::Upper => stat >= observed,
                Tail::Lower => stat <= observed,
                Tail::TwoSided => stat.abs() >= observed.abs(),
            })
            .count();
        let p_value = extreme as f64 / permutations as f64;

        let (mean, std_dev) = welford(&null);
        let z_score = if std_dev > 0.0 {
            (observed - mean) / std_dev
        } else {
            0.0
        };

        info!(
            "Mantel test ({method}, {tail}, {permutations} permutations): r={observed} p={p_value} z={z_score}"
        );

        Ok(MantelResult {
            correlation: observed,
            p_value,
            z_score,
            permutations,
            method,
            tail,
        })
    }

    #[cfg(feature = "parallel")]
    fn worker_pool(&self) -> Option<rayon::ThreadPool> {
        if !self.config.use_threads {
            return None;
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers.max(1))
            .build()
            .map_err(|error| {
                log::warn!("Failed to build worker pool ({error}); running sequentially")
            })
            .ok()
    }

    #[cfg(not(feature = "parallel"))]
    fn worker_pool(&self) -> Option<()> {
        if self.config.use_threads {
            log::warn!(
                "Threaded permutation test requested, but the 'parallel' feature is not enabled; falling back to sequential mode"
            );
        }
        None
    }
}

#[cfg(feature = "parallel")]
fn evaluate_batch<F>(pool: &Option<rayon::ThreadPool>, orders: &[Vec<usize>], f: F) -> Vec<f64>
where
    F: Fn(&Vec<usize>) -> f64 + Sync + Send,
{
    match pool {
        Some(pool) => pool.install(|| orders.par_iter().map(&f).collect()),
        None => orders.iter().map(f).collect(),
    }
}

#[cfg(not(feature = "parallel"))]
fn evaluate_batch<F>(_pool: &Option<()>, orders: &[Vec<usize>], f: F) -> Vec<f64>
where
    F: Fn(&Vec<usize>) -> f64,
{
    orders.iter().map(f).collect()
}

/// Item count shared by both vectors.
fn implied_items(x: &[f64], y: &[f64]) -> Result<usize> {
    let mismatch = CompositionalityError::SizeMismatch {
        first: x.len(),
        second: y.len(),
    };
    if x.len() != y.len() {
        return Err(mismatch);
    }
    if x.is_empty() {
        return Err(CompositionalityError::InsufficientData { items: 0 });
    }
    items_for_condensed_len(x.len()).ok_or(mismatch)
}

/// Deviations from the mean and their sum of squares.
fn residuals(values: &[f64]) -> (Vec<f64>, f64) {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let res: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let ss = res.iter().map(|r| r * r).sum();
    (res, ss)
}

/// Pearson correlation of `x` against `y` with `y`'s items relabelled by
/// `order`. Both inputs are already centred.
fn permuted_correlation(
    x_res: &[f64],
    y_matrix: &DistanceMatrix,
    order: &[usize],
    denominator: f64,
) -> f64 {
    let n = order.len();
    let mut dot = 0.0;
    let mut k = 0;
    for i in 0..n {
        for j in i + 1..n {
            dot += x_res[k] * y_matrix.get(order[i], order[j]);
            k += 1;
        }
    }
    dot / denominator
}

/// Mean and population standard deviation via Welford's update.
fn welford(values: &[f64]) -> (f64, f64) {
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (count, &value) in values.iter().enumerate() {
        let delta = value - mean;
        mean += delta / (count + 1) as f64;
        m2 += delta * (value - mean);
    }
    (mean, (m2 / values.len() as f64).sqrt())
}

/// Pearson correlation coefficient, `None` if either input is constant or
/// the lengths differ.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (x_res, sxx) = residuals(x);
    let (y_res, syy) = residuals(y);
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 {
        return None;
    }
    let dot: f64 = x_res.iter().zip(&y_res).map(|(a, b)| a * b).sum();
    Some(dot / denom)
}

/// Spearman rank correlation (Pearson over average ranks).
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// 1-based ranks; tied values share the mean of the ranks they span.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < indexed.len() {
        let mut end = start + 1;
        while end < indexed.len() && indexed[end].1 == indexed[start].1 {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &(idx, _) in &indexed[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::condensed_len;

    fn random_condensed(n: usize, rng: &mut StdRng) -> Vec<f64> {
        (0..condensed_len(n)).map(|_| rng.gen_range(0.0..1.0)).collect()
    }

    fn test_with(method: CorrelationMethod, tail: Tail, permutations: usize) -> MantelTest {
        MantelTest::new(MantelConfig {
            method,
            tail,
            permutations,
            seed: Some(7),
            ..MantelConfig::default()
        })
    }

    #[test]
    fn identical_vectors_give_best_possible_p() {
        let mut rng = StdRng::seed_from_u64(42);
        let x = random_condensed(12, &mut rng);
        let result = test_with(CorrelationMethod::Pearson, Tail::Upper, 999)
            .run(&x, &x)
            .unwrap();
        assert!((result.correlation - 1.0).abs() < 1e-12);
        assert_eq!(result.p_value, 1.0 / 999.0);
        assert!(result.z_score > 3.0);
    }

    #[test]
    fn seeded_runs_are_bit_identical() {
        let mut rng = StdRng::seed_from_u64(1);
        let x = random_condensed(9, &mut rng);
        let y = random_condensed(9, &mut rng);
        for method in [CorrelationMethod::Pearson, CorrelationMethod::Spearman] {
            for tail in [Tail::Upper, Tail::Lower, Tail::TwoSided] {
                let test = test_with(method, tail, 500);
                let a = test.run(&x, &y).unwrap();
                let b = test.run(&x, &y).unwrap();
                assert_eq!(a.correlation.to_bits(), b.correlation.to_bits());
                assert_eq!(a.p_value.to_bits(), b.p_value.to_bits());
                assert_eq!(a.z_score.to_bits(), b.z_score.to_bits());
            }
        }
    }

    #[test]
    fn threaded_statistics_follow_sequential_stream() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = random_condensed(10, &mut rng);
        let y = random_condensed(10, &mut rng);
        let sequential = test_with(CorrelationMethod::Pearson, Tail::TwoSided, 2500)
            .run(&x, &y)
            .unwrap();
        let threaded = MantelTest::new(MantelConfig {
            use_threads: true,
            max_workers: 4,
            ..*test_with(CorrelationMethod::Pearson, Tail::TwoSided, 2500).config()
        })
        .run(&x, &y)
        .unwrap();
        assert_eq!(sequential, threaded);
    }

    #[test]
    fn independent_vectors_rarely_significant() {
        let trials = 200;
        let mut false_positives = 0;
        for seed in 0..trials {
            let mut rng = StdRng::seed_from_u64(1000 + seed);
            let x = random_condensed(8, &mut rng);
            let y = random_condensed(8, &mut rng);
            let result = test_with(CorrelationMethod::Pearson, Tail::Upper, 199)
                .run_with_rng(&x, &y, &mut rng)
                .unwrap();
            assert!(result.p_value >= 1.0 / 199.0);
            if result.p_value <= 0.05 {
                false_positives += 1;
            }
        }
        let rate = false_positives as f64 / trials as f64;
        assert!(rate < 0.12, "false-positive rate {rate}");
    }

    #[test]
    fn tails_cover_observed_trial() {
        let mut rng = StdRng::seed_from_u64(11);
        let x = random_condensed(6, &mut rng);
        let y: Vec<f64> = x.iter().map(|v| -v).collect();
        let lower = test_with(CorrelationMethod::Pearson, Tail::Lower, 300)
            .run(&x, &y)
            .unwrap();
        assert!((lower.correlation + 1.0).abs() < 1e-12);
        assert!(lower.p_value < 0.05);
        assert!(lower.z_score < 0.0);

        let upper = test_with(CorrelationMethod::Pearson, Tail::Upper, 300)
            .run(&x, &y)
            .unwrap();
        assert!(upper.p_value > 0.9);

        let two = test_with(CorrelationMethod::Pearson, Tail::TwoSided, 300)
            .run(&x, &y)
            .unwrap();
        assert!(two.p_value >= lower.p_value);
    }

    #[test]
    fn single_permutation_is_identity_only() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![3.0, 1.0, 2.0];
        let result = test_with(CorrelationMethod::Pearson, Tail::Upper, 1)
            .run(&x, &y)
            .unwrap();
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.z_score, 0.0);
        assert!((result.correlation - pearson(&x, &y).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn spearman_uses_ranks() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y: Vec<f64> = x.iter().map(|v: &f64| v.powi(3)).collect();
        let result = test_with(CorrelationMethod::Spearman, Tail::Upper, 100)
            .run(&x, &y)
            .unwrap();
        assert!((result.correlation - 1.0).abs() < 1e-12);
        assert!(spearman(&x, &y).unwrap() > pearson(&x, &y).unwrap());
    }

    #[test]
    fn average_ranks_split_ties() {
        assert_eq!(average_ranks(&[0.5, 0.1, 0.5, 0.9]), vec![2.5, 1.0, 2.5, 4.0]);
        assert_eq!(average_ranks(&[1.0, 1.0, 1.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let test = test_with(CorrelationMethod::Pearson, Tail::Upper, 10);
        assert_eq!(
            test.run(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err(),
            CompositionalityError::SizeMismatch {
                first: 3,
                second: 2
            }
        );
        assert_eq!(
            test.run(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0, 4.0])
                .unwrap_err(),
            CompositionalityError::SizeMismatch {
                first: 4,
                second: 4
            }
        );
        assert_eq!(
            test.run(&[1.0], &[2.0]).unwrap_err(),
            CompositionalityError::InsufficientData { items: 2 }
        );
        assert_eq!(
            test.run(&[], &[]).unwrap_err(),
            CompositionalityError::InsufficientData { items: 0 }
        );
        assert_eq!(
            test.run(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).unwrap_err(),
            CompositionalityError::ConstantVector { which: "first" }
        );
        assert_eq!(
            test_with(CorrelationMethod::Pearson, Tail::Upper, 0)
                .run(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0])
                .unwrap_err(),
            CompositionalityError::InvalidPermutations
        );
    }

    #[test]
    fn parses_method_and_tail_names() {
        assert_eq!("Spearman".parse::<CorrelationMethod>(), Ok(CorrelationMethod::Spearman));
        assert_eq!("two-sided".parse::<Tail>(), Ok(Tail::TwoSided));
        assert_eq!(Tail::TwoSided.to_string(), "two-sided");
        assert!("kendall".parse::<CorrelationMethod>().is_err());
    }
}
