//! Error taxonomy for distance construction and the Mantel test.

use thiserror::Error;

/// Errors raised by the alignment engine, the distance batch and the
/// permutation test. All of them abort the current run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionalityError {
    /// A word contains a symbol that the substitution table does not list.
    #[error("Symbol '{symbol}' in word '{word}' not found in substitution table")]
    UnknownSymbol { symbol: String, word: String },

    /// Self-alignment scores of a pair sum to zero, so the normalised
    /// distance has no value.
    #[error(
        "Distance undefined between '{first}' (item {i}) and '{second}' (item {j}): self-alignment scores sum to zero"
    )]
    DistanceUndefined {
        first: String,
        second: String,
        i: usize,
        j: usize,
    },

    /// Same failure for a lone pair aligned outside any batch, where no
    /// item positions exist.
    #[error(
        "Distance undefined between '{first}' and '{second}': self-alignment scores sum to zero"
    )]
    PairDistanceUndefined { first: String, second: String },

    /// The two distance vectors differ in length, or a length is not a
    /// triangular number.
    #[error(
        "Size mismatch: {first} vs {second} entries (lengths must be equal and of the form n(n-1)/2)"
    )]
    SizeMismatch { first: usize, second: usize },

    /// Fewer than three items were supplied.
    #[error("Insufficient data: {items} items (at least 3 required)")]
    InsufficientData { items: usize },

    /// A distance vector has no variance, so no correlation exists.
    #[error("Distance vector '{which}' is constant; correlation undefined")]
    ConstantVector { which: &'static str },

    /// Zero permutations requested.
    #[error("Permutation count must be positive")]
    InvalidPermutations,

    /// Feature vectors disagree on dimensionality.
    #[error("Meaning {index} has {found} features, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// A meaning without any feature.
    #[error("Meaning {index} has no features")]
    EmptyFeatureVector { index: usize },

    /// Word and meaning lists of different lengths.
    #[error("{words} words but {meanings} meanings")]
    ItemCountMismatch { words: usize, meanings: usize },

    /// The substitution table is structurally unusable.
    #[error("Invalid substitution table: {0}")]
    InvalidTable(String),
}

pub type Result<T, E = CompositionalityError> = std::result::Result<T, E>;
