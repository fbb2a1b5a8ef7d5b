//! End-to-end compositionality analysis: word distances, meaning distances
//! and the Mantel test between them.

use log::{info, warn};
use serde::Serialize;

use crate::distances::{meaning_distance_matrix, BatchOptions, FeatureVector, WordDistances};
use crate::error::{CompositionalityError, Result};
use crate::mantel::{MantelConfig, MantelResult, MantelTest};
use crate::matrix::DistanceMatrix;
use crate::symbols::{Segmentation, SubstitutionTable, Word};

/// Items of one language: each word paired with its meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct Language {
    words: Vec<Word>,
    meanings: Vec<FeatureVector>,
}

impl Language {
    pub fn new(words: Vec<Word>, meanings: Vec<FeatureVector>) -> Result<Self> {
        if words.len() != meanings.len() {
            return Err(CompositionalityError::ItemCountMismatch {
                words: words.len(),
                meanings: meanings.len(),
            });
        }
        Ok(Self { words, meanings })
    }

    /// Build from `(word, features)` pairs, segmenting each word.
    pub fn from_pairs<W, F, S>(
        items: impl IntoIterator<Item = (W, F)>,
        segmentation: Segmentation,
    ) -> Self
    where
        W: Into<String>,
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (words, meanings) = items
            .into_iter()
            .map(|(word, features)| {
                (
                    Word::new(word, segmentation),
                    features.into_iter().map(Into::into).collect(),
                )
            })
            .unzip();
        Self { words, meanings }
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn meanings(&self) -> &[FeatureVector] {
        &self.meanings
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Parameters for one analysis run.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisConfig {
    /// Score added per gap position during alignment.
    pub gap_cost: f64,
    pub mantel: MantelConfig,
    pub batch: BatchOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            gap_cost: -1.0,
            mantel: MantelConfig::default(),
            batch: BatchOptions::default(),
        }
    }
}

/// Both distance matrices of a language, built before any significance test.
#[derive(Debug, Clone)]
pub struct LanguageDistances {
    pub words: Vec<Word>,
    pub word_distances: DistanceMatrix,
    pub meaning_distances: DistanceMatrix,
}

/// Everything an analysis run produces.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub words: Vec<Word>,
    pub word_distances: DistanceMatrix,
    pub meaning_distances: DistanceMatrix,
    pub mantel: MantelResult,
}

/// Serialisable summary of a report.
#[derive(Debug, Serialize)]
pub struct ReportSummary<'a> {
    pub items: usize,
    pub words: Vec<&'a str>,
    pub gap_cost: f64,
    pub seed: Option<u64>,
    pub mantel: &'a MantelResult,
}

impl AnalysisReport {
    pub fn summary(&self, config: &AnalysisConfig) -> ReportSummary<'_> {
        ReportSummary {
            items: self.words.len(),
            words: self.words.iter().map(Word::text).collect(),
            gap_cost: config.gap_cost,
            seed: config.mantel.seed,
            mantel: &self.mantel,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Analysis {
    config: AnalysisConfig,
}

impl Analysis {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Distances between every pair of words.
    pub fn word_distances(
        &self,
        words: &[Word],
        table: &SubstitutionTable,
    ) -> Result<DistanceMatrix> {
        let distances =
            WordDistances::compute(words, table, self.config.gap_cost, self.config.batch)?;
        Ok(distances.into_matrix())
    }

    /// Word and meaning distance matrices for any non-empty language. Callers
    /// that persist the matrices can do so before [`Analysis::test`], which
    /// needs at least three items.
    pub fn distances(
        &self,
        language: &Language,
        table: &SubstitutionTable,
    ) -> Result<LanguageDistances> {
        if !table.is_symmetric() {
            warn!("Substitution table is not symmetric; word distances depend on pair order");
        }
        info!(
            "Analysing {} items over {} symbols",
            language.len(),
            table.len()
        );

        let meaning_distances = meaning_distance_matrix(language.meanings())?;
        let word_distances = self.word_distances(language.words(), table)?;
        Ok(LanguageDistances {
            words: language.words().to_vec(),
            word_distances,
            meaning_distances,
        })
    }

    /// Mantel test between the word and meaning matrices.
    pub fn test(&self, distances: LanguageDistances) -> Result<AnalysisReport> {
        let n = distances.words.len();
        if n < 3 {
            return Err(CompositionalityError::InsufficientData { items: n });
        }
        let mantel = MantelTest::new(self.config.mantel)
            .run_matrices(&distances.word_distances, &distances.meaning_distances)?;

        Ok(AnalysisReport {
            words: distances.words,
            word_distances: distances.word_distances,
            meaning_distances: distances.meaning_distances,
            mantel,
        })
    }

    /// Run the full analysis. Input validation (item count, meaning shape,
    /// symbol coverage) completes before any alignment or permutation work
    /// starts.
    pub fn run(&self, language: &Language, table: &SubstitutionTable) -> Result<AnalysisReport> {
        let n = language.len();
        if n < 3 {
            return Err(CompositionalityError::InsufficientData { items: n });
        }
        self.test(self.distances(language, table)?)
    }
}
