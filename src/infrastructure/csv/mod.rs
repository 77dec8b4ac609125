// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// Delimited table reading with encoding detection

mod csv_parser;

pub use csv_parser::CsvParser;
