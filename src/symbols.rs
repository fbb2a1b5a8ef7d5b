//! Words, their segmentation into symbols, and the substitution table that
//! scores symbol pairs.

use std::collections::HashMap;
use std::fmt;

use crate::error::{CompositionalityError, Result};

/// How a written word is split into alignment symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Segmentation {
    /// One symbol per Unicode scalar value.
    #[default]
    Characters,
    /// Symbols separated by a delimiter (e.g. `p.a` or `t ʃ a`); empty
    /// tokens are dropped.
    Delimited(char),
}

impl Segmentation {
    pub fn split(self, text: &str) -> Vec<String> {
        match self {
            Self::Characters => text.chars().map(String::from).collect(),
            Self::Delimited(sep) => text
                .split(sep)
                .filter(|token| !token.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

/// A word as read from the language file together with its symbol sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    text: String,
    symbols: Vec<String>,
}

impl Word {
    pub fn new(text: impl Into<String>, segmentation: Segmentation) -> Self {
        let text = text.into();
        let symbols = segmentation.split(&text);
        Self { text, symbols }
    }

    /// Build a word from an explicit symbol sequence.
    pub fn from_symbols<S: Into<String>>(symbols: impl IntoIterator<Item = S>) -> Self {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        let text = symbols.concat();
        Self { text, symbols }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Dense square table of similarity weights between symbols.
///
/// Entries are similarities: larger means more alike. Symbols are interned
/// to indices so the alignment inner loop is a flat array lookup.
#[derive(Debug, Clone)]
pub struct SubstitutionTable {
    symbols: Vec<String>,
    index: HashMap<String, usize>,
    scores: Vec<f64>,
}

impl SubstitutionTable {
    /// Build a table from its symbol labels and score rows (row `i`,
    /// column `j` scores `symbols[i]` against `symbols[j]`).
    pub fn new(symbols: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if symbols.is_empty() {
            return Err(CompositionalityError::InvalidTable(
                "no symbols".to_string(),
            ));
        }
        let k = symbols.len();
        if rows.len() != k {
            return Err(CompositionalityError::InvalidTable(format!(
                "{} symbols but {} rows",
                k,
                rows.len()
            )));
        }

        let mut index = HashMap::with_capacity(k);
        for (i, symbol) in symbols.iter().enumerate() {
            if index.insert(symbol.clone(), i).is_some() {
                return Err(CompositionalityError::InvalidTable(format!(
                    "duplicate symbol '{symbol}'"
                )));
            }
        }

        let mut scores = Vec::with_capacity(k * k);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != k {
                return Err(CompositionalityError::InvalidTable(format!(
                    "row '{}' has {} entries, expected {}",
                    symbols[i],
                    row.len(),
                    k
                )));
            }
            if let Some(bad) = row.iter().find(|value| !value.is_finite()) {
                return Err(CompositionalityError::InvalidTable(format!(
                    "row '{}' contains non-finite score {bad}",
                    symbols[i]
                )));
            }
            scores.extend(row);
        }

        Ok(Self {
            symbols,
            index,
            scores,
        })
    }

    /// Table scoring identical symbols `matched` and every other pair
    /// `mismatched`.
    pub fn identity<S: Into<String>>(
        symbols: impl IntoIterator<Item = S>,
        matched: f64,
        mismatched: f64,
    ) -> Result<Self> {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        let k = symbols.len();
        let rows = (0..k)
            .map(|i| {
                (0..k)
                    .map(|j| if i == j { matched } else { mismatched })
                    .collect()
            })
            .collect();
        Self::new(symbols, rows)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn symbol(&self, index: usize) -> &str {
        &self.symbols[index]
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    /// Score of symbol index `a` against symbol index `b`.
    #[inline]
    pub fn score(&self, a: usize, b: usize) -> f64 {
        self.scores[a * self.symbols.len() + b]
    }

    /// Score by symbol label, `None` if either symbol is unlisted.
    pub fn lookup(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.score(self.index_of(a)?, self.index_of(b)?))
    }

    pub fn is_symmetric(&self) -> bool {
        let k = self.symbols.len();
        (0..k).all(|i| (i + 1..k).all(|j| self.score(i, j) == self.score(j, i)))
    }

    /// Translate a word into symbol indices.
    pub fn encode(&self, word: &Word) -> Result<Vec<usize>> {
        word.symbols()
            .iter()
            .map(|symbol| {
                self.index_of(symbol)
                    .ok_or_else(|| CompositionalityError::UnknownSymbol {
                        symbol: symbol.clone(),
                        word: word.text().to_string(),
                    })
            })
            .collect()
    }

    /// Encode a whole batch, failing on the first unknown symbol before any
    /// caller gets to align anything.
    pub fn encode_all(&self, words: &[Word]) -> Result<Vec<Vec<usize>>> {
        words.iter().map(|word| self.encode(word)).collect()
    }
}
