// 🔗 Pipeline - load → clean → fetch → reconcile → aggregate
// Strictly sequential. The first fatal error aborts the run, tagged with its stage.

use crate::analysis::{AnalysisReport, Analyzer, DatasetSummary, Findings};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage};
use crate::loader::{CleanOutcome, RawTable, RecordLoader};
use crate::reconcile::{Reconciler, Reconciliation};
use crate::roster::{RosterSource, RosterSummary};
use crate::table::{self, Table};
use chrono::{DateTime, Utc};
use log::info;
use std::path::{Path, PathBuf};

/// Everything one run produced, in memory
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: PathBuf,
    pub encoding: String,
    pub used_fallback: bool,
    pub roster_source: String,
    pub cleaning: CleanOutcome,
    pub dataset: DatasetSummary,
    pub roster: RosterSummary,
    pub reconciliation: Reconciliation,
    pub analysis: AnalysisReport,
    pub findings: Findings,
    round_decimals: u32,
}

impl PipelineOutcome {
    /// The five output tables, in a fixed order
    pub fn tables(&self) -> anyhow::Result<Vec<Table>> {
        let d = self.round_decimals;
        Ok(vec![
            table::reconciled_table(&self.reconciliation.records, d)?,
            table::group_table("by_party", "party_code", &self.analysis.by_party, d)?,
            table::group_table("by_region", "region_code", &self.analysis.by_region, d)?,
            table::category_table(&self.analysis.by_category, d)?,
            table::payee_table(&self.analysis.top_payees, d)?,
        ])
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    roster: Box<dyn RosterSource>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, roster: Box<dyn RosterSource>) -> Self {
        Pipeline { config, roster }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load and clean only (no roster needed)
    pub fn load_and_clean(&self, input: &Path) -> Result<(RawTable, CleanOutcome), PipelineError> {
        let loader = RecordLoader::new(self.config.csv.clone());

        info!("▶ {}: {}", Stage::Load, input.display());
        let raw = loader.load(input).map_err(|e| e.in_stage(Stage::Load))?;

        info!("▶ {}", Stage::Clean);
        let cleaned = loader.clean(&raw);

        Ok((raw, cleaned))
    }

    pub fn run(&self, input: &Path) -> Result<PipelineOutcome, PipelineError> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        let (raw, cleaning) = self.load_and_clean(input)?;
        let dataset = DatasetSummary::from_records(&cleaning.records);

        info!("▶ {}: {}", Stage::Fetch, self.roster.describe());
        let roster = self
            .roster
            .fetch_roster()
            .map_err(|e| e.in_stage(Stage::Fetch))?;
        let roster_summary = RosterSummary::from_records(&roster);

        info!("▶ {}", Stage::Reconcile);
        let reconciliation = Reconciler::new(&roster).reconcile(&cleaning.records);

        info!("▶ {}", Stage::Aggregate);
        let analyzer = Analyzer::new(self.config.analysis.clone());
        let analysis = analyzer.full_report(&reconciliation.records);
        let findings = Findings::from_report(&reconciliation.records, &analysis);

        Ok(PipelineOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            input: input.to_path_buf(),
            encoding: raw.encoding,
            used_fallback: raw.used_fallback,
            roster_source: self.roster.describe(),
            cleaning,
            dataset,
            roster: roster_summary,
            reconciliation,
            analysis,
            findings,
            round_decimals: self.config.analysis.round_decimals,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
