//! Distance matrices over a batch of items: alignment distances between
//! words and feature-mismatch distances between meanings.

use log::{debug, info};

use crate::alignment::{normalised_distance, Aligner};
use crate::error::{CompositionalityError, Result};
use crate::matrix::DistanceMatrix;
use crate::symbols::{SubstitutionTable, Word};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Categorical meaning of one item, one value per dimension.
pub type FeatureVector = Vec<String>;

/// Execution options for the pairwise alignment batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Spread rows of the matrix over a worker pool (needs the `parallel`
    /// feature).
    pub use_threads: bool,
    /// Worker count when threading is enabled.
    pub max_workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            use_threads: false,
            max_workers: 1,
        }
    }
}

/// Alignment distances between every pair of words in a batch.
#[derive(Debug, Clone)]
pub struct WordDistances {
    matrix: DistanceMatrix,
    self_scores: Vec<f64>,
}

impl WordDistances {
    /// Validate the batch, cache each word's self-alignment score, then fill
    /// the upper triangle.
    ///
    /// Every word is encoded before any alignment runs, so an unknown symbol
    /// aborts the batch without partial output.
    pub fn compute(
        words: &[Word],
        table: &SubstitutionTable,
        gap: f64,
        options: BatchOptions,
    ) -> Result<Self> {
        let encoded = table.encode_all(words)?;
        let aligner = Aligner::new(table, gap);

        let self_scores: Vec<f64> = encoded.iter().map(|e| aligner.score(e, e)).collect();
        debug!("Cached {} self-alignment scores", self_scores.len());

        let row = |i: usize| -> Result<Vec<f64>> {
            (i + 1..encoded.len())
                .map(|j| -> Result<f64> {
                    let sim_ab = aligner.score(&encoded[i], &encoded[j]);
                    let distance = normalised_distance(sim_ab, self_scores[i], self_scores[j])
                        .ok_or_else(|| CompositionalityError::DistanceUndefined {
                            first: words[i].text().to_string(),
                            second: words[j].text().to_string(),
                            i,
                            j,
                        })?;
                    if log::log_enabled!(log::Level::Debug) {
                        let (top, bottom) =
                            aligner.align(&encoded[i], &encoded[j]).render(table);
                        debug!("{top}\n{bottom}     distance={distance}");
                    }
                    Ok(distance)
                })
                .collect()
        };

        let n = words.len();
        let rows: Vec<Result<Vec<f64>>> = if options.use_threads {
            run_rows_threaded(n, options.max_workers, row)
        } else {
            (0..n).map(row).collect()
        };

        let mut condensed = Vec::with_capacity(crate::matrix::condensed_len(n));
        for row in rows {
            condensed.extend(row?);
        }
        let matrix = DistanceMatrix::from_condensed(n, condensed)?;
        info!("Word distance matrix built for {} words", n);

        Ok(Self {
            matrix,
            self_scores,
        })
    }

    pub fn matrix(&self) -> &DistanceMatrix {
        &self.matrix
    }

    /// Self-alignment score of each word, in input order.
    pub fn self_scores(&self) -> &[f64] {
        &self.self_scores
    }

    pub fn into_matrix(self) -> DistanceMatrix {
        self.matrix
    }
}

#[cfg(feature = "parallel")]
fn run_rows_threaded<F>(n: usize, max_workers: usize, row: F) -> Vec<Result<Vec<f64>>>
where
    F: Fn(usize) -> Result<Vec<f64>> + Sync,
{
    use rayon::ThreadPoolBuilder;

    match ThreadPoolBuilder::new()
        .num_threads(max_workers.max(1))
        .build()
    {
        Ok(pool) => pool.install(|| (0..n).into_par_iter().map(&row).collect()),
        Err(error) => {
            log::warn!("Failed to build worker pool ({error}); using the global pool");
            (0..n).into_par_iter().map(&row).collect()
        }
    }
}

#[cfg(not(feature = "parallel"))]
fn run_rows_threaded<F>(n: usize, _max_workers: usize, row: F) -> Vec<Result<Vec<f64>>>
where
    F: Fn(usize) -> Result<Vec<f64>>,
{
    log::warn!(
        "Threaded distance computation requested, but the 'parallel' feature is not enabled; falling back to sequential mode"
    );
    (0..n).map(row).collect()
}

/// Check that every meaning is non-empty and shares one dimensionality.
pub fn validate_meanings(meanings: &[FeatureVector]) -> Result<usize> {
    let Some(first) = meanings.first() else {
        return Ok(0);
    };
    let expected = first.len();
    for (index, meaning) in meanings.iter().enumerate() {
        if meaning.is_empty() {
            return Err(CompositionalityError::EmptyFeatureVector { index });
        }
        if meaning.len() != expected {
            return Err(CompositionalityError::DimensionMismatch {
                index,
                expected,
                found: meaning.len(),
            });
        }
    }
    Ok(expected)
}

/// Fraction of dimensions on which two meanings disagree.
pub fn meaning_distance(a: &[String], b: &[String]) -> f64 {
    let differing = a.iter().zip(b).filter(|(x, y)| x != y).count();
    differing as f64 / a.len() as f64
}

/// Distances between all meanings: the proportion of mismatching features.
pub fn meaning_distance_matrix(meanings: &[FeatureVector]) -> Result<DistanceMatrix> {
    validate_meanings(meanings)?;
    DistanceMatrix::try_from_fn(meanings.len(), |i, j| {
        Ok(meaning_distance(&meanings[i], &meanings[j]))
    })
}
