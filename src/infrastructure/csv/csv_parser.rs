// ============================================================
// CSV PARSER
// ============================================================
// Line-oriented, quote-aware parsing of the fault price table

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::domain::error::{AppError, Result};

const DELIMITER: u8 = b',';

/// Tolerant CSV parser.
///
/// Each physical line is parsed on its own, so an unbalanced quote only
/// damages the row it appears in. A comma splits fields only when an even
/// number of quotes precede it on the line, whatever whitespace surrounds
/// the quotes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvParser;

impl CsvParser {
    pub fn new() -> Self {
        Self
    }

    /// Read a table file, decoding it to text.
    pub fn read_file(&self, path: &Path) -> Result<String> {
        let buffer = std::fs::read(path).map_err(|e| {
            AppError::ResourceLoadFailure(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Ok(Self::decode(&buffer))
    }

    /// UTF-8 (BOM aware) first, then Windows-1256 for legacy Arabic exports.
    fn decode(buffer: &[u8]) -> String {
        let (text, _, had_errors) = encoding_rs::UTF_8.decode(buffer);
        if !had_errors {
            return text.into_owned();
        }

        let (text, encoding, _) = encoding_rs::WINDOWS_1256.decode(buffer);
        debug!(encoding = encoding.name(), "Table is not valid UTF-8, decoded as legacy");
        text.into_owned()
    }

    /// Split content into rows of cleaned fields. The first line is the
    /// header and is discarded.
    pub fn parse_content(&self, content: &str) -> Vec<Vec<String>> {
        content
            .lines()
            .skip(1)
            .enumerate()
            .filter_map(|(index, line)| match self.parse_line(line) {
                Ok(fields) => Some(fields),
                Err(err) => {
                    debug!(row = index + 1, error = %err, "Skipping unreadable row");
                    None
                }
            })
            .collect()
    }

    fn parse_line(&self, line: &str) -> std::result::Result<Vec<String>, csv::Error> {
        // Quotes are kept literal here and paired up in `join_quoted`.
        let mut reader = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .quoting(false)
            .trim(Trim::None)
            .flexible(true)
            .from_reader(line.as_bytes());

        let mut record = StringRecord::new();
        if !reader.read_record(&mut record)? {
            return Ok(Vec::new());
        }

        Ok(Self::join_quoted(&record)
            .iter()
            .map(|value| Self::clean_value(value))
            .collect())
    }

    /// Re-joins raw tokens while an opened quote is still unbalanced.
    fn join_quoted(record: &StringRecord) -> Vec<String> {
        let mut fields: Vec<String> = Vec::with_capacity(record.len());
        let mut open = false;

        for token in record.iter() {
            match fields.last_mut() {
                Some(field) if open => {
                    field.push(DELIMITER as char);
                    field.push_str(token);
                }
                _ => fields.push(token.to_string()),
            }
            if token.matches('"').count() % 2 == 1 {
                open = !open;
            }
        }
        fields
    }

    /// Strip the double quotes and surrounding whitespace.
    fn clean_value(value: &str) -> String {
        value.replace('"', "").trim().to_string()
    }
}
