// 💾 Run Output - timestamped directory with CSV tables + JSON summary

use crate::analysis::{DatasetSummary, Findings};
use crate::error::Stage;
use crate::loader::CleaningReport;
use crate::pipeline::PipelineOutcome;
use crate::reconcile::ReconciliationReport;
use crate::roster::RosterSummary;
use crate::store;
use crate::table::Table;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
pub const SUMMARY_FILE: &str = "run_summary.json";
pub const SQLITE_FILE: &str = "results.db";

// ============================================================================
// RUN SUMMARY
// ============================================================================

/// Everything about a run except the row-level data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: PathBuf,
    pub encoding: String,
    pub used_fallback: bool,
    pub roster_source: String,
    pub cleaning: CleaningReport,
    pub dataset: DatasetSummary,
    pub roster: RosterSummary,
    pub reconciliation: ReconciliationReport,
    pub findings: Findings,
    /// Files written into the run directory
    pub files: Vec<String>,
}

impl RunSummary {
    pub fn from_outcome(outcome: &PipelineOutcome, files: Vec<String>) -> Self {
        RunSummary {
            run_id: outcome.run_id.clone(),
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            input: outcome.input.clone(),
            encoding: outcome.encoding.clone(),
            used_fallback: outcome.used_fallback,
            roster_source: outcome.roster_source.clone(),
            cleaning: outcome.cleaning.report.clone(),
            dataset: outcome.dataset.clone(),
            roster: outcome.roster.clone(),
            reconciliation: outcome.reconciliation.report.clone(),
            findings: outcome.findings.clone(),
            files,
        }
    }
}

// ============================================================================
// RUN WRITER
// ============================================================================

pub struct RunWriter {
    root: PathBuf,
    sqlite: bool,
}

impl RunWriter {
    pub fn new(root: &Path) -> Self {
        RunWriter {
            root: root.to_path_buf(),
            sqlite: false,
        }
    }

    pub fn with_sqlite(mut self, enabled: bool) -> Self {
        self.sqlite = enabled;
        self
    }

    /// `<root>/run_YYYYmmdd_HHMMSS`, suffixed `_2`, `_3`, ... if taken
    pub fn create_run_dir(&self, at: DateTime<Local>) -> Result<PathBuf> {
        let base = format!("run_{}", at.format("%Y%m%d_%H%M%S"));
        let mut dir = self.root.join(&base);
        let mut n = 2;
        while dir.exists() {
            dir = self.root.join(format!("{}_{}", base, n));
            n += 1;
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Write every table plus the summary; returns the run directory
    pub fn write(&self, outcome: &PipelineOutcome) -> Result<PathBuf> {
        info!("▶ {}", Stage::Output);

        let dir = self.create_run_dir(Local::now())?;
        let tables = outcome.tables()?;

        let mut files = Vec::new();
        for table in &tables {
            let name = format!("{}.csv", table.name);
            write_table_csv(&dir.join(&name), table)?;
            info!("Wrote {} ({} rows)", name, table.row_count());
            files.push(name);
        }

        if self.sqlite {
            files.push(SQLITE_FILE.to_string());
        }
        files.push(SUMMARY_FILE.to_string());
        let summary = RunSummary::from_outcome(outcome, files);

        if self.sqlite {
            store::export_sqlite(&dir.join(SQLITE_FILE), &tables, &summary)?;
            info!("Wrote {}", SQLITE_FILE);
        }

        write_summary_json(&dir.join(SUMMARY_FILE), &summary)?;
        info!("Wrote {}", SUMMARY_FILE);

        Ok(dir)
    }
}

/// UTF-8 with BOM so spreadsheet tools pick the right encoding
pub fn write_table_csv(path: &Path, table: &Table) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(UTF8_BOM)?;
    let mut writer = csv::Writer::from_writer(out);
    table
        .write_csv(&mut writer)
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_summary_json(path: &Path) -> Result<RunSummary> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).context("Failed to parse run summary")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_dir_name_and_collision() {
        let root = tempfile::tempdir().unwrap();
        let writer = RunWriter::new(root.path());
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();

        let first = writer.create_run_dir(at).unwrap();
        let second = writer.create_run_dir(at).unwrap();

        assert_eq!(first.file_name().unwrap(), "run_20240305_140709");
        assert_eq!(second.file_name().unwrap(), "run_20240305_140709_2");
        assert!(first.is_dir() && second.is_dir());
    }

    #[test]
    fn test_table_csv_has_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let mut table = Table::new("t", &["a"]);
        table
            .push_row(vec![crate::table::Cell::Text("São Paulo".to_string())])
            .unwrap();

        write_table_csv(&path, &table).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        assert!(bytes.starts_with(UTF8_BOM));
        assert_eq!(&bytes[3..], "a\nSão Paulo\n".as_bytes());
    }
}
