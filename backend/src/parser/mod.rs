//! CSV tokenizer with encoding auto-detection.
//!
//! Turns raw CSV bytes into a matrix of trimmed strings. No schema logic here:
//! the matrix goes to [`crate::transform::decoder`] as is.
//!
//! Blank lines are skipped. Rows of empty cells (`,,,`) are kept, since an
//! empty first cell ends the scene data.

use std::path::Path;

use crate::error::{ParseError, ParseResult};

/// Default field delimiter.
pub const DEFAULT_DELIMITER: u8 = b',';

/// Byte form of a delimiter; `None` unless it is a single ASCII character.
pub fn delimiter_byte(delimiter: char) -> Option<u8> {
    u8::try_from(delimiter).ok().filter(u8::is_ascii)
}

/// Tokenized CSV with metadata.
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    /// One entry per non-blank line, cells trimmed.
    pub rows: Vec<Vec<String>>,
    /// Detected encoding
    pub encoding: String,
    /// Delimiter used
    pub delimiter: char,
}

impl ParsedCsv {
    /// Width of the widest row.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Detect the encoding of raw bytes.
///
/// Valid UTF-8 is always reported as UTF-8; chardet decides for other bytes.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the given encoding label.
///
/// Bytes that are valid UTF-8 are read as UTF-8 whatever the label. Unknown
/// labels fall back to lossy UTF-8. A leading byte-order mark is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> ParseResult<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(strip_bom(text).to_string());
    }

    let content = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                let (decoded, _, had_errors) = encoding.decode(bytes);
                if had_errors {
                    return Err(ParseError::Encoding(label.to_string()));
                }
                decoded.into_owned()
            }
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    Ok(strip_bom(&content).to_string())
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Tokenize CSV text into a matrix of trimmed cells.
///
/// Rows may have different widths; the decoder reports short rows per cell.
///
/// # Example
/// ```ignore
/// use trialforge::parser::parse_matrix;
///
/// let rows = parse_matrix("Scene name, Number of objects\nroom1, 1\n", b',').unwrap();
/// assert_eq!(rows, vec![vec!["Scene name", "Number of objects"], vec!["room1", "1"]]);
/// ```
pub fn parse_matrix(content: &str, delimiter: u8) -> ParseResult<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    if rows.is_empty() {
        return Err(ParseError::EmptyFile);
    }

    Ok(rows)
}

/// Tokenize CSV bytes, detecting their encoding.
pub fn parse_bytes_auto(bytes: &[u8], delimiter: u8) -> ParseResult<ParsedCsv> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let rows = parse_matrix(&content, delimiter)?;

    Ok(ParsedCsv {
        rows,
        encoding,
        delimiter: delimiter as char,
    })
}

/// Tokenize a CSV file, detecting its encoding.
///
/// # Example
/// ```ignore
/// let parsed = parse_csv_file_auto("scenes.csv", b',')?;
/// println!("Encoding: {}, rows: {}", parsed.encoding, parsed.rows.len());
/// ```
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P, delimiter: u8) -> ParseResult<ParsedCsv> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes, delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(csv: &str) -> Vec<Vec<String>> {
        parse_matrix(csv, DEFAULT_DELIMITER).unwrap()
    }

    #[test]
    fn test_cells_are_trimmed() {
        let rows = matrix("Scene name , Number of objects\n room1 ,1\n");

        assert_eq!(rows[0], vec!["Scene name", "Number of objects"]);
        assert_eq!(rows[1], vec!["room1", "1"]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let rows = matrix("a,b\n\n1,2\n\n\n3,4\n");
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_empty_cell_rows_kept() {
        let rows = matrix("a,b\n1,2\n,\n3,4\n");

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], vec!["", ""]);
    }

    #[test]
    fn test_quoted_list_cell() {
        // CSV quoting is undone; the inner quotes are the list wrapper.
        let rows = matrix("pos\n\"\"\"1, 2, 3\"\"\"\n");
        assert_eq!(rows[1], vec!["\"1, 2, 3\""]);
    }

    #[test]
    fn test_ragged_rows() {
        let rows = matrix("a,b,c\n1\n");
        assert_eq!(rows[1], vec!["1"]);
    }

    #[test]
    fn test_empty_csv_error() {
        assert!(matches!(parse_matrix("", b','), Err(ParseError::EmptyFile)));
        assert!(matches!(parse_matrix("\n\n", b','), Err(ParseError::EmptyFile)));
    }

    #[test]
    fn test_custom_delimiter() {
        let rows = parse_matrix("a;b\n1;2", b';').unwrap();
        assert_eq!(rows[1], vec!["1", "2"]);
    }

    #[test]
    fn test_delimiter_byte() {
        assert_eq!(delimiter_byte(';'), Some(b';'));
        assert_eq!(delimiter_byte('\t'), Some(b'\t'));
        assert_eq!(delimiter_byte('é'), None);
    }

    #[test]
    fn test_auto_parse() {
        let parsed = parse_bytes_auto(b"name,count\nroom1,2\n", b',').unwrap();

        assert_eq!(parsed.encoding, "utf-8");
        assert_eq!(parsed.delimiter, ',');
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.column_count(), 2);
    }

    #[test]
    fn test_accented_utf8_is_not_misdetected() {
        let parsed = parse_bytes_auto("Scène,Nombre d'objets\nchambre,1\n".as_bytes(), b',').unwrap();

        assert_eq!(parsed.encoding, "utf-8");
        assert_eq!(parsed.rows[0], vec!["Scène", "Nombre d'objets"]);
    }

    #[test]
    fn test_utf8_wins_over_label() {
        let decoded = decode_content("Société".as_bytes(), "iso-8859-9").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_bom_dropped() {
        let decoded = decode_content("\u{feff}a,b".as_bytes(), "utf-8").unwrap();
        assert_eq!(decoded, "a,b");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenes.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let parsed = parse_csv_file_auto(&path, b',').unwrap();
        assert_eq!(parsed.rows[1], vec!["1", "2"]);
    }
}
