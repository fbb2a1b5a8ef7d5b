//! compositionality
//!
//! Measures how far similar-sounding words carry similar meanings. Words are
//! compared by normalised global-alignment distance under a substitution
//! table, meanings by the share of differing features, and the two distance
//! matrices are correlated with a Mantel permutation test.

pub mod alignment;
pub mod distances;
pub mod error;
pub mod io;
pub mod mantel;
pub mod matrix;
pub mod pipeline;
pub mod symbols;

pub use alignment::{normalised_distance, Aligner, Alignment, Move};
pub use distances::{
    meaning_distance, meaning_distance_matrix, validate_meanings, BatchOptions, FeatureVector,
    WordDistances,
};
pub use error::CompositionalityError;
pub use io::{
    parse_language, parse_substitution_table, read_language, read_substitution_table,
    save_distance_matrix, write_distance_matrix, InputError,
};
pub use mantel::{
    average_ranks, pearson, spearman, CorrelationMethod, MantelConfig, MantelResult, MantelTest,
    ParseOptionError, Tail,
};
pub use matrix::{condensed_len, items_for_condensed_len, DistanceMatrix};
pub use pipeline::{
    Analysis, AnalysisConfig, AnalysisReport, Language, LanguageDistances, ReportSummary,
};
pub use symbols::{Segmentation, SubstitutionTable, Word};
