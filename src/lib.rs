// Expense Reconciliation Pipeline - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod config;
pub mod normalize;
pub mod loader;
pub mod roster;
pub mod reconcile;
pub mod analysis;
pub mod table;
pub mod pipeline;
pub mod report;
pub mod store;

// Re-export commonly used types
pub use error::{PipelineError, Stage};
pub use config::{AnalysisConfig, ColumnMap, CsvFormat, OutputConfig, PipelineConfig, RosterConfig};
pub use normalize::{normalize, normalize_opt};
pub use loader::{
    parse_amount, CleanOutcome, CleaningReport, ExpenseRecord, RawRow, RawTable, RecordLoader,
};
pub use roster::{
    parse_roster_page, FileRosterSource, HttpRosterClient, InMemoryRoster, LegislatorRecord,
    RosterSource, RosterSummary,
};
pub use reconcile::{
    Affiliation, ReconciledRecord, Reconciler, Reconciliation, ReconciliationReport,
    RosterAmbiguity, RosterIndex, UNMATCHED,
};
pub use analysis::{
    AnalysisReport, Analyzer, CategoryStats, DatasetSummary, Findings, GroupStats, PayeeTotal,
};
pub use table::{Cell, Column, Table};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use report::{RunSummary, RunWriter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
