use std::path::Path;

use tracing::{info, warn};

use crate::domain::fault_record::{FaultRecord, DEFAULT_SOURCE};
use crate::infrastructure::csv::CsvParser;

/// Minimum number of non-empty fields for a row to become a record.
const MIN_FIELDS: usize = 6;
/// code, description, part, price, hours, labor cost, source.
const RECORD_FIELDS: usize = 7;

/// In-memory fault price table. Built once per session, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct FaultRecordStore {
    records: Vec<FaultRecord>,
}

impl FaultRecordStore {
    pub fn new(records: Vec<FaultRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse raw table text. The first line is a header; short rows are
    /// dropped without error.
    pub fn load(raw_text: &str) -> Self {
        let records = CsvParser::new()
            .parse_content(raw_text)
            .into_iter()
            .filter_map(Self::record_from_fields)
            .collect();

        Self { records }
    }

    /// Load from a file. Any read failure degrades to an empty store.
    pub fn load_from_path(path: &Path) -> Self {
        match CsvParser::new().read_file(path) {
            Ok(raw_text) => {
                let store = Self::load(&raw_text);
                info!(path = %path.display(), records = store.len(), "Fault table loaded");
                store
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Fault table unavailable, continuing with an empty table");
                Self::empty()
            }
        }
    }

    fn record_from_fields(fields: Vec<String>) -> Option<FaultRecord> {
        let mut fields: Vec<String> = fields.into_iter().take(RECORD_FIELDS).collect();
        let non_empty = fields.iter().filter(|value| !value.is_empty()).count();
        if non_empty < MIN_FIELDS {
            return None;
        }
        fields.resize(RECORD_FIELDS, String::new());

        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();
        let code = next();
        let description = next();
        let part = next();
        let price = next();
        let hours = next();
        let labor_cost = next();
        let source = Some(next())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

        Some(FaultRecord {
            code,
            description,
            part,
            price,
            hours,
            labor_cost,
            source,
        })
    }

    pub fn records(&self) -> &[FaultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Case-insensitive exact match, first in table order.
    pub fn find_by_code(&self, code: &str) -> Option<&FaultRecord> {
        self.records.iter().find(|record| record.matches_code(code))
    }

    /// First record whose part name appears literally in any of the given
    /// texts. Table order decides between several hits.
    pub fn find_by_keyword(&self, haystacks: &[&str]) -> Option<&FaultRecord> {
        self.records.iter().find(|record| {
            !record.part.is_empty() && haystacks.iter().any(|text| text.contains(&record.part))
        })
    }
}
