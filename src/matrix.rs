//! Symmetric, zero-diagonal distance matrix stored as its strict upper
//! triangle.

use crate::error::{CompositionalityError, Result};

/// Number of strict upper-triangle entries for `n` items.
#[inline]
pub fn condensed_len(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Item count implied by a condensed vector of `len` entries, if `len` is a
/// triangular number.
pub fn items_for_condensed_len(len: usize) -> Option<usize> {
    // n = (1 + sqrt(1 + 8·len)) / 2, then verify exactly
    let approx = ((1.0 + (1.0 + 8.0 * len as f64).sqrt()) / 2.0).round() as usize;
    (approx.saturating_sub(1)..=approx + 1).find(|&n| n >= 2 && condensed_len(n) == len)
}

/// Pairwise distances over `n` items.
///
/// Entries are kept row-major over `i < j`: `(0,1), (0,2), …, (0,n-1), (1,2), …`.
/// `get(i, i)` is always `0.0` and `get(i, j) == get(j, i)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    condensed: Vec<f64>,
}

impl DistanceMatrix {
    /// Wrap an upper-triangle vector for `n` items.
    pub fn from_condensed(n: usize, condensed: Vec<f64>) -> Result<Self> {
        if condensed.len() != condensed_len(n) {
            return Err(CompositionalityError::SizeMismatch {
                first: condensed.len(),
                second: condensed_len(n),
            });
        }
        Ok(Self { n, condensed })
    }

    /// Build by evaluating `f(i, j)` for every `i < j`, in row-major order.
    pub fn try_from_fn<F>(n: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> Result<f64>,
    {
        let mut condensed = Vec::with_capacity(condensed_len(n));
        for i in 0..n {
            for j in i + 1..n {
                condensed.push(f(i, j)?);
            }
        }
        Ok(Self { n, condensed })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.n && j < self.n, "index ({i}, {j}) out of bounds for {} items", self.n);
        match i.cmp(&j) {
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Less => self.condensed[self.offset(i, j)],
            std::cmp::Ordering::Greater => self.condensed[self.offset(j, i)],
        }
    }

    /// The strict upper triangle, row-major.
    pub fn upper_triangle(&self) -> &[f64] {
        &self.condensed
    }

    pub fn into_upper_triangle(self) -> Vec<f64> {
        self.condensed
    }

    /// Iterate rows of the full square matrix.
    pub fn rows(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        (0..self.n).map(move |i| (0..self.n).map(|j| self.get(i, j)).collect())
    }

    /// Matrix with items reordered: entry `(i, j)` of the result is entry
    /// `(order[i], order[j])` of `self`. Rows and columns move together.
    pub fn permuted(&self, order: &[usize]) -> Self {
        assert_eq!(order.len(), self.n, "permutation length mismatch");
        let mut condensed = Vec::with_capacity(self.condensed.len());
        for i in 0..self.n {
            for j in i + 1..self.n {
                condensed.push(self.get(order[i], order[j]));
            }
        }
        Self {
            n: self.n,
            condensed,
        }
    }

    #[inline]
    fn offset(&self, i: usize, j: usize) -> usize {
        // entries in rows 0..i, then column offset within row i
        i * self.n - i * (i + 1) / 2 + (j - i - 1)
    }
}
