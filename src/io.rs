//! Readers for language and substitution-table files, and the labelled CSV
//! writer for distance matrices.
//!
//! Inputs ending in `.gz`/`.bgz` are decompressed on the fly.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use log::debug;

use crate::distances::{validate_meanings, FeatureVector};
use crate::error::CompositionalityError;
use crate::matrix::DistanceMatrix;
use crate::pipeline::Language;
use crate::symbols::{Segmentation, SubstitutionTable, Word};

const FIELD_SEPARATOR: char = ',';

/// Errors raised while reading or writing analysis files.
#[derive(thiserror::Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input contains no data rows")]
    Empty,
    #[error("Line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("Line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },
    #[error(transparent)]
    Invalid(#[from] CompositionalityError),
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("bgz"))
        .unwrap_or(false)
}

/// Open a file for buffered reading, transparently decompressing gzip.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, InputError> {
    let file = File::open(path)?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Non-empty lines with their 1-based line numbers, carriage returns removed.
fn data_lines<R: BufRead>(reader: R) -> Result<Vec<(usize, String)>, InputError> {
    let mut lines = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?.replace('\r', "");
        if line.trim().is_empty() {
            continue;
        }
        lines.push((idx + 1, line));
    }
    Ok(lines)
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(FIELD_SEPARATOR).map(str::trim).collect()
}

/// Parse a language table: a header line, then `word,feature1,feature2,...`
/// per item.
pub fn parse_language<R: BufRead>(
    reader: R,
    segmentation: Segmentation,
) -> Result<Language, InputError> {
    let lines = data_lines(reader)?;
    let mut words = Vec::new();
    let mut meanings: Vec<FeatureVector> = Vec::new();

    for (line_no, line) in lines.iter().skip(1) {
        let fields = split_fields(line);
        let (word, features) = fields.split_first().ok_or_else(|| InputError::Malformed {
            line: *line_no,
            message: "missing word".to_string(),
        })?;
        if word.is_empty() {
            return Err(InputError::Malformed {
                line: *line_no,
                message: "empty word".to_string(),
            });
        }
        words.push(Word::new(*word, segmentation));
        meanings.push(features.iter().map(|f| f.to_string()).collect());
    }

    if words.is_empty() {
        return Err(InputError::Empty);
    }
    let dims = validate_meanings(&meanings)?;
    debug!("Parsed {} items with {} meaning dimensions", words.len(), dims);
    Ok(Language::new(words, meanings)?)
}

pub fn read_language(path: &Path, segmentation: Segmentation) -> Result<Language, InputError> {
    parse_language(open_reader(path)?, segmentation)
}

/// Parse a substitution table: a header `label,sym1,...,symK`, then one row
/// `symI,v1,...,vK` per symbol in header order.
pub fn parse_substitution_table<R: BufRead>(reader: R) -> Result<SubstitutionTable, InputError> {
    let lines = data_lines(reader)?;
    let ((_, header), rows) = lines.split_first().ok_or(InputError::Empty)?;
    let symbols: Vec<String> = split_fields(header)
        .into_iter()
        .skip(1)
        .map(String::from)
        .collect();

    let mut scores = Vec::with_capacity(rows.len());
    for (row_idx, (line_no, line)) in rows.iter().enumerate() {
        let fields = split_fields(line);
        let (label, values) = fields.split_first().ok_or_else(|| InputError::Malformed {
            line: *line_no,
            message: "missing row label".to_string(),
        })?;
        match symbols.get(row_idx) {
            Some(expected) if expected == label => {}
            Some(expected) => {
                return Err(InputError::Malformed {
                    line: *line_no,
                    message: format!("row label '{label}' does not match column '{expected}'"),
                })
            }
            None => {
                return Err(InputError::Malformed {
                    line: *line_no,
                    message: format!("extra row '{label}' beyond {} columns", symbols.len()),
                })
            }
        }
        let row = values
            .iter()
            .map(|value| {
                value.parse::<f64>().map_err(|_| InputError::InvalidNumber {
                    line: *line_no,
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        scores.push(row);
    }

    Ok(SubstitutionTable::new(symbols, scores)?)
}

pub fn read_substitution_table(path: &Path) -> Result<SubstitutionTable, InputError> {
    parse_substitution_table(open_reader(path)?)
}

/// Write the full square matrix as CSV with a `Words` header row and one
/// labelled row per item.
pub fn write_distance_matrix<W: Write>(
    mut writer: W,
    labels: &[Word],
    matrix: &DistanceMatrix,
) -> Result<(), InputError> {
    let header: Vec<&str> = labels.iter().map(Word::text).collect();
    writeln!(writer, "Words{FIELD_SEPARATOR}{}", header.join(","))?;
    for (label, row) in labels.iter().zip(matrix.rows()) {
        let cells: Vec<String> = row.iter().map(|d| d.to_string()).collect();
        writeln!(writer, "{}{FIELD_SEPARATOR}{}", label.text(), cells.join(","))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the matrix to `path`, creating parent directories as needed.
pub fn save_distance_matrix(
    path: &Path,
    labels: &[Word],
    matrix: &DistanceMatrix,
) -> Result<(), InputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    write_distance_matrix(std::io::BufWriter::new(file), labels, matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_language_with_header_and_crlf() {
        let text = "word,shape,colour\r\npa,circle,red\r\n\r\nta,square,red\r\n";
        let language = parse_language(Cursor::new(text), Segmentation::Characters).unwrap();
        assert_eq!(language.len(), 2);
        assert_eq!(language.words()[1].text(), "ta");
        assert_eq!(language.meanings()[0], vec!["circle", "red"]);
    }

    #[test]
    fn language_with_ragged_meanings_is_rejected() {
        let text = "word,a,b\npa,x,y\nta,x\n";
        let err = parse_language(Cursor::new(text), Segmentation::Characters).unwrap_err();
        assert!(matches!(
            err,
            InputError::Invalid(CompositionalityError::DimensionMismatch { index: 1, .. })
        ));

        let err = parse_language(Cursor::new("word,a\n"), Segmentation::Characters).unwrap_err();
        assert!(matches!(err, InputError::Empty));
    }

    #[test]
    fn parses_substitution_table() {
        let text = ",p,a\np,2,-1\na,-1,2.5\n";
        let table = parse_substitution_table(Cursor::new(text)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("a", "a"), Some(2.5));
        assert_eq!(table.lookup("p", "a"), Some(-1.0));
    }

    #[test]
    fn substitution_table_errors_name_the_line() {
        let err = parse_substitution_table(Cursor::new(",p,a\np,2,x\na,1,1\n")).unwrap_err();
        assert!(matches!(err, InputError::InvalidNumber { line: 2, ref value } if value == "x"));

        let err = parse_substitution_table(Cursor::new(",p,a\na,2,1\np,1,1\n")).unwrap_err();
        assert!(matches!(err, InputError::Malformed { line: 2, .. }));

        let err = parse_substitution_table(Cursor::new(",p,a\np,2,1\n")).unwrap_err();
        assert!(matches!(
            err,
            InputError::Invalid(CompositionalityError::InvalidTable(_))
        ));
    }

    #[test]
    fn writes_labelled_square_matrix() {
        let labels = vec![
            Word::new("pa", Segmentation::Characters),
            Word::new("ta", Segmentation::Characters),
        ];
        let matrix = DistanceMatrix::from_condensed(2, vec![0.75]).unwrap();
        let mut out = Vec::new();
        write_distance_matrix(&mut out, &labels, &matrix).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Words,pa,ta\npa,0,0.75\nta,0.75,0\n"
        );
    }
}
