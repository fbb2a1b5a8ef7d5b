//! Global (Needleman–Wunsch style) alignment over a substitution table and the
//! normalised distance built on top of it.
//!
//! Scores are similarities and the recurrence maximises them. For cell
//! `(i, j)` the candidates are, in tie-break priority order:
//!
//! 1. [`Move::Diagonal`]: `A[i-1]` against `B[j-1]`, scored by the table;
//! 2. [`Move::Up`]: `A[i-1]` against a gap, scored by the gap cost;
//! 3. [`Move::Left`]: a gap against `B[j-1]`, scored by the gap cost.
//!
//! A later candidate only wins when it is strictly better, so the reported
//! alignment is stable across runs.

use crate::error::{CompositionalityError, Result};
use crate::symbols::{SubstitutionTable, Word};

/// Traceback direction recorded for each DP cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Diagonal,
    Up,
    Left,
}

/// Two gap-padded sequences of symbol indices plus their raw similarity.
///
/// `None` marks a gap; both sides always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub first: Vec<Option<usize>>,
    pub second: Vec<Option<usize>>,
    pub score: f64,
}

impl Alignment {
    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    /// Render both rows as space-separated symbols with `-` for gaps.
    pub fn render(&self, table: &SubstitutionTable) -> (String, String) {
        let row = |cells: &[Option<usize>]| {
            cells
                .iter()
                .map(|cell| cell.map_or("-", |idx| table.symbol(idx)))
                .collect::<Vec<_>>()
                .join(" ")
        };
        (row(&self.first), row(&self.second))
    }
}

/// Normalise a pairwise similarity by the two self-similarities:
/// `1 - 2·sim_ab / (sim_aa + sim_bb)`. Returns `None` when the denominator
/// is zero.
pub fn normalised_distance(sim_ab: f64, sim_aa: f64, sim_bb: f64) -> Option<f64> {
    let denominator = sim_aa + sim_bb;
    if denominator == 0.0 {
        return None;
    }
    Some(1.0 - (2.0 * sim_ab) / denominator)
}

/// Pairwise global aligner bound to one substitution table and gap cost.
#[derive(Debug, Clone, Copy)]
pub struct Aligner<'a> {
    table: &'a SubstitutionTable,
    gap: f64,
}

impl<'a> Aligner<'a> {
    pub fn new(table: &'a SubstitutionTable, gap: f64) -> Self {
        Self { table, gap }
    }

    pub fn table(&self) -> &'a SubstitutionTable {
        self.table
    }

    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// Best-scoring global alignment of two encoded sequences, with traceback.
    pub fn align(&self, a: &[usize], b: &[usize]) -> Alignment {
        let (n, m) = (a.len(), b.len());
        let width = m + 1;
        let mut scores = vec![0.0f64; (n + 1) * width];
        let mut moves = vec![Move::Diagonal; (n + 1) * width];

        for i in 1..=n {
            scores[i * width] = scores[(i - 1) * width] + self.gap;
            moves[i * width] = Move::Up;
        }
        for j in 1..=m {
            scores[j] = scores[j - 1] + self.gap;
            moves[j] = Move::Left;
        }

        for i in 1..=n {
            for j in 1..=m {
                let (best, mv) = self.step(
                    scores[(i - 1) * width + (j - 1)],
                    scores[(i - 1) * width + j],
                    scores[i * width + (j - 1)],
                    a[i - 1],
                    b[j - 1],
                );
                scores[i * width + j] = best;
                moves[i * width + j] = mv;
            }
        }

        let mut first = Vec::with_capacity(n + m);
        let mut second = Vec::with_capacity(n + m);
        let (mut i, mut j) = (n, m);
        while i > 0 || j > 0 {
            match moves[i * width + j] {
                Move::Diagonal => {
                    i -= 1;
                    j -= 1;
                    first.push(Some(a[i]));
                    second.push(Some(b[j]));
                }
                Move::Up => {
                    i -= 1;
                    first.push(Some(a[i]));
                    second.push(None);
                }
                Move::Left => {
                    j -= 1;
                    first.push(None);
                    second.push(Some(b[j]));
                }
            }
        }
        first.reverse();
        second.reverse();

        Alignment {
            first,
            second,
            score: scores[n * width + m],
        }
    }

    /// Optimal alignment score only, using two DP rows.
    pub fn score(&self, a: &[usize], b: &[usize]) -> f64 {
        let m = b.len();
        let mut prev = vec![0.0f64; m + 1];
        for j in 1..=m {
            prev[j] = prev[j - 1] + self.gap;
        }
        let mut curr = vec![0.0f64; m + 1];

        for &sym_a in a {
            curr[0] = prev[0] + self.gap;
            for j in 1..=m {
                curr[j] = self.step(prev[j - 1], prev[j], curr[j - 1], sym_a, b[j - 1]).0;
            }
            std::mem::swap(&mut prev, &mut curr);
        }
        prev[m]
    }

    /// Align two words, encoding them through the table first.
    pub fn align_words(&self, a: &Word, b: &Word) -> Result<Alignment> {
        let ea = self.table.encode(a)?;
        let eb = self.table.encode(b)?;
        Ok(self.align(&ea, &eb))
    }

    /// Normalised distance between two words.
    ///
    /// Both words are validated against the table before any alignment runs.
    /// Batches should go through [`crate::WordDistances`], which caches the
    /// self-alignment scores and reports item positions on failure.
    pub fn distance(&self, a: &Word, b: &Word) -> Result<f64> {
        let ea = self.table.encode(a)?;
        let eb = self.table.encode(b)?;
        let sim_ab = self.score(&ea, &eb);
        let sim_aa = self.score(&ea, &ea);
        let sim_bb = self.score(&eb, &eb);
        normalised_distance(sim_ab, sim_aa, sim_bb).ok_or_else(|| {
            CompositionalityError::PairDistanceUndefined {
                first: a.text().to_string(),
                second: b.text().to_string(),
            }
        })
    }

    #[inline]
    fn step(&self, diag: f64, up: f64, left: f64, sym_a: usize, sym_b: usize) -> (f64, Move) {
        let mut best = diag + self.table.score(sym_a, sym_b);
        let mut mv = Move::Diagonal;
        let up = up + self.gap;
        if up > best {
            best = up;
            mv = Move::Up;
        }
        let left = left + self.gap;
        if left > best {
            best = left;
            mv = Move::Left;
        }
        (best, mv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Segmentation;

    fn word(text: &str) -> Word {
        Word::new(text, Segmentation::Characters)
    }

    fn pata_table() -> SubstitutionTable {
        SubstitutionTable::identity(["p", "t", "a"], 2.0, -1.0).unwrap()
    }

    #[test]
    fn worked_example_pa_ta() {
        let table = pata_table();
        let aligner = Aligner::new(&table, -1.0);

        let alignment = aligner.align_words(&word("pa"), &word("ta")).unwrap();
        assert_eq!(alignment.score, 1.0);
        assert_eq!(alignment.render(&table), ("p a".to_string(), "t a".to_string()));

        let d = aligner.distance(&word("pa"), &word("ta")).unwrap();
        assert!((d - 0.75).abs() < 1e-12);
    }

    #[test]
    fn one_mismatch_out_of_three() {
        let table = SubstitutionTable::identity(["c", "b", "a", "t"], 1.0, 0.0).unwrap();
        let aligner = Aligner::new(&table, 0.0);
        let d = aligner.distance(&word("cat"), &word("bat")).unwrap();
        assert!(d > 0.0 && d < 1.0);
        assert!((d - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn self_distance_is_zero_and_distance_symmetric() {
        let table = SubstitutionTable::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![
                vec![3.0, 0.5, -1.0],
                vec![0.5, 2.0, 0.25],
                vec![-1.0, 0.25, 1.5],
            ],
        )
        .unwrap();
        let aligner = Aligner::new(&table, -0.75);
        let words = ["abc", "cab", "aab", "c", "bbbca"];
        for a in &words {
            assert_eq!(aligner.distance(&word(a), &word(a)).unwrap(), 0.0);
            for b in &words {
                let ab = aligner.distance(&word(a), &word(b)).unwrap();
                let ba = aligner.distance(&word(b), &word(a)).unwrap();
                assert_eq!(ab, ba, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn gaps_fill_length_difference() {
        let table = pata_table();
        let aligner = Aligner::new(&table, -1.0);
        let alignment = aligner.align_words(&word("pata"), &word("pa")).unwrap();
        assert_eq!(alignment.len(), 4);
        assert_eq!(alignment.second.iter().filter(|c| c.is_none()).count(), 2);
        // 2 matches (+4) and 2 gaps (-2)
        assert_eq!(alignment.score, 2.0);
    }

    #[test]
    fn score_matches_traceback_score() {
        let table = pata_table();
        let aligner = Aligner::new(&table, -1.5);
        let pairs = [("pat", "tap"), ("", "pa"), ("ppp", "a"), ("tatata", "ata")];
        for (a, b) in pairs {
            let ea = table.encode(&word(a)).unwrap();
            let eb = table.encode(&word(b)).unwrap();
            assert_eq!(aligner.score(&ea, &eb), aligner.align(&ea, &eb).score);
        }
    }

    #[test]
    fn ties_prefer_diagonal_then_up() {
        // every option scores zero: diagonal must win at every cell
        let table = SubstitutionTable::identity(["a", "b"], 0.0, 0.0).unwrap();
        let aligner = Aligner::new(&table, 0.0);
        let alignment = aligner.align_words(&word("ab"), &word("ba")).unwrap();
        assert!(alignment.first.iter().all(Option::is_some));
        assert!(alignment.second.iter().all(Option::is_some));

        let alignment = aligner.align_words(&word("aab"), &word("b")).unwrap();
        let (top, bottom) = alignment.render(&table);
        assert_eq!(top, "a a b");
        assert_eq!(bottom, "- - b");
    }

    #[test]
    fn zero_self_similarity_is_undefined() {
        let table = SubstitutionTable::identity(["a", "b"], 0.0, 0.0).unwrap();
        let aligner = Aligner::new(&table, 0.0);
        let err = aligner.distance(&word("ab"), &word("ba")).unwrap_err();
        assert_eq!(
            err,
            CompositionalityError::PairDistanceUndefined {
                first: "ab".into(),
                second: "ba".into()
            }
        );

        let table = pata_table();
        let aligner = Aligner::new(&table, -1.0);
        let err = aligner.distance(&word(""), &word("")).unwrap_err();
        assert!(matches!(
            err,
            CompositionalityError::PairDistanceUndefined { .. }
        ));
    }

    #[test]
    fn unknown_symbol_is_reported() {
        let table = pata_table();
        let aligner = Aligner::new(&table, -1.0);
        let err = aligner.distance(&word("pa"), &word("ka")).unwrap_err();
        assert_eq!(
            err,
            CompositionalityError::UnknownSymbol {
                symbol: "k".into(),
                word: "ka".into()
            }
        );
    }
}
