// 📂 Record Loader - Delimited file → cleaned expense records
// Two steps kept separate so the triage counts are testable:
//   load()  : bytes → decoded text → header check → RawTable
//   clean() : RawTable → ExpenseRecord[] + CleaningReport

use crate::config::CsvFormat;
use crate::error::PipelineError;
use crate::normalize::normalize;
use encoding_rs::Encoding;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ============================================================================
// EXPENSE RECORD
// ============================================================================

/// One cleaned expense line. `amount` is always > 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub payee_name: String,
    /// Empty when the source cell was blank
    pub category: String,
    pub amount: f64,
}

impl ExpenseRecord {
    pub fn new(payee_name: &str, category: &str, amount: f64) -> Self {
        ExpenseRecord {
            payee_name: payee_name.to_string(),
            category: category.to_string(),
            amount,
        }
    }

    /// Fingerprint used to drop exact duplicates. The payee is compared in
    /// canonical form, so spellings differing only in case or accents collide.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalize(&self.payee_name).as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.category.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.amount.to_bits().to_be_bytes());
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// RAW TABLE
// ============================================================================

/// A source row reduced to the three columns the pipeline keeps.
/// `None` = the cell was absent or blank.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line in the source file (header is line 1)
    pub line_number: u64,
    pub payee: Option<String>,
    pub category: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RawTable {
    pub source: PathBuf,
    /// Label of the encoding that decoded the file
    pub encoding: String,
    pub used_fallback: bool,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// CLEANING REPORT
// ============================================================================

/// Triage of every raw row: each one is kept or counted in exactly one bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub raw_rows: usize,
    pub nulls_removed: usize,
    pub invalid_removed: usize,
    pub duplicates_removed: usize,
    pub final_rows: usize,
}

impl CleaningReport {
    pub fn total_removed(&self) -> usize {
        self.nulls_removed + self.invalid_removed + self.duplicates_removed
    }

    /// Percentage of raw rows removed
    pub fn reduction_pct(&self) -> f64 {
        if self.raw_rows == 0 {
            return 0.0;
        }
        self.total_removed() as f64 / self.raw_rows as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} raw rows: {} null, {} invalid amount, {} duplicate removed → {} kept ({:.1}% reduction)",
            self.raw_rows,
            self.nulls_removed,
            self.invalid_removed,
            self.duplicates_removed,
            self.final_rows,
            self.reduction_pct()
        )
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub records: Vec<ExpenseRecord>,
    pub report: CleaningReport,
}

// ============================================================================
// RECORD LOADER
// ============================================================================

pub struct RecordLoader {
    format: CsvFormat,
}

impl RecordLoader {
    pub fn new(format: CsvFormat) -> Self {
        RecordLoader { format }
    }

    pub fn format(&self) -> &CsvFormat {
        &self.format
    }

    /// Read, decode and schema-check a source file
    pub fn load(&self, path: &Path) -> Result<RawTable, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }

        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::io(format!("reading {}", path.display()), e))?;

        let (text, encoding, used_fallback) = self.decode(path, &bytes)?;
        let mut table = self.parse(&text)?;
        table.source = path.to_path_buf();
        table.encoding = encoding;
        table.used_fallback = used_fallback;

        info!(
            "Loaded {} rows from {} ({} columns, encoding {})",
            table.rows.len(),
            path.display(),
            table.headers.len(),
            table.encoding
        );

        Ok(table)
    }

    /// Primary encoding first; on malformed input, exactly one retry with the fallback
    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<(String, String, bool), PipelineError> {
        let primary = lookup_encoding(&self.format.encoding)?;
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        if let Some(text) = primary.decode_without_bom_handling_and_without_replacement(body) {
            return Ok((text.into_owned(), primary.name().to_string(), false));
        }

        let fallback_label = match &self.format.fallback_encoding {
            Some(label) => label,
            None => {
                return Err(PipelineError::Encoding {
                    path: path.to_path_buf(),
                    primary: primary.name().to_string(),
                    fallback: None,
                })
            }
        };
        let fallback = lookup_encoding(fallback_label)?;

        warn!(
            "{} is not valid {}; retrying with {}",
            path.display(),
            primary.name(),
            fallback.name()
        );

        match fallback.decode_without_bom_handling_and_without_replacement(body) {
            Some(text) => Ok((text.into_owned(), fallback.name().to_string(), true)),
            None => Err(PipelineError::Encoding {
                path: path.to_path_buf(),
                primary: primary.name().to_string(),
                fallback: Some(fallback.name().to_string()),
            }),
        }
    }

    /// Parse already-decoded text. Exposed for callers that decode themselves.
    pub fn parse(&self, text: &str) -> Result<RawTable, PipelineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.format.delimiter_byte()?)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().trim_matches('"').to_string())
            .collect();

        let columns = &self.format.columns;
        let find = |name: &str| headers.iter().position(|h| h == name);
        let (payee_idx, category_idx, amount_idx) =
            (find(&columns.payee), find(&columns.category), find(&columns.amount));

        let missing: Vec<String> = [
            (&columns.payee, payee_idx),
            (&columns.category, category_idx),
            (&columns.amount, amount_idx),
        ]
        .iter()
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| name.to_string())
        .collect();

        let (payee_idx, category_idx, amount_idx) = match (payee_idx, category_idx, amount_idx) {
            (Some(p), Some(c), Some(a)) => (p, c, a),
            _ => {
                return Err(PipelineError::Schema {
                    missing,
                    available: headers,
                })
            }
        };

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let line_number = record.position().map(|p| p.line()).unwrap_or_default();
            let cell = |idx: usize| {
                record
                    .get(idx)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };
            rows.push(RawRow {
                line_number,
                payee: cell(payee_idx),
                category: cell(category_idx),
                amount: cell(amount_idx),
            });
        }

        Ok(RawTable {
            source: PathBuf::new(),
            encoding: String::new(),
            used_fallback: false,
            headers,
            rows,
        })
    }

    /// Drop null, invalid-amount and duplicate rows (in that order)
    pub fn clean(&self, raw: &RawTable) -> CleanOutcome {
        let mut report = CleaningReport {
            raw_rows: raw.rows.len(),
            ..CleaningReport::default()
        };
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(raw.rows.len());

        for row in &raw.rows {
            let (payee, amount_text) = match (&row.payee, &row.amount) {
                (Some(p), Some(a)) => (p, a),
                _ => {
                    report.nulls_removed += 1;
                    continue;
                }
            };

            let amount = match parse_amount(amount_text, &self.format) {
                Some(v) if v > 0.0 => v,
                _ => {
                    debug!("line {}: dropping amount {:?}", row.line_number, amount_text);
                    report.invalid_removed += 1;
                    continue;
                }
            };

            let record = ExpenseRecord {
                payee_name: payee.clone(),
                category: row.category.clone().unwrap_or_default(),
                amount,
            };

            if !seen.insert(record.compute_idempotency_hash()) {
                report.duplicates_removed += 1;
                continue;
            }

            records.push(record);
        }

        report.final_rows = records.len();
        info!("Cleaned: {}", report.summary());

        CleanOutcome { records, report }
    }
}

fn lookup_encoding(label: &str) -> Result<&'static Encoding, PipelineError> {
    Encoding::for_label(label.as_bytes()).ok_or_else(|| PipelineError::Config {
        message: format!("unknown encoding label '{}'", label),
    })
}

/// Parse a number written with the configured separators.
///
/// With the defaults (`,` decimal, `.` thousands) `"1.234,56"` is 1234.56.
/// Returns `None` for blank, unparseable or non-finite input.
pub fn parse_amount(text: &str, format: &CsvFormat) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut cleaned = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c == format.thousands_separator || c.is_whitespace() {
            continue;
        }
        if c == format.decimal_separator {
            cleaned.push('.');
        } else {
            cleaned.push(c);
        }
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// TESTS
// ============================================================================
