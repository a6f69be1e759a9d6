// 📊 Aggregator - Spending by party, region, category and payee
// Pure reductions over reconciled records. UNMATCHED rows never enter the
// party/region/category/payee tables; empty input gives empty tables.

use crate::config::AnalysisConfig;
use crate::loader::ExpenseRecord;
use crate::normalize::normalize;
use crate::reconcile::ReconciledRecord;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

// ============================================================================
// OUTPUT ROWS
// ============================================================================

/// One row of the by-party / by-region tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub group_key: String,
    pub total: f64,
    pub mean: f64,
    pub median: f64,
    pub count: usize,
    pub distinct_payees: usize,
    pub mean_per_payee: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: String,
    pub total: f64,
    pub mean: f64,
    pub count: usize,
    /// Already rounded to `percentage_decimals`
    pub percentage_of_grand_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayeeTotal {
    pub payee_name: String,
    pub party_code: String,
    pub region_code: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub by_party: Vec<GroupStats>,
    pub by_region: Vec<GroupStats>,
    pub by_category: Vec<CategoryStats>,
    pub top_payees: Vec<PayeeTotal>,
}

// ============================================================================
// HELPERS
// ============================================================================

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Median of a non-empty slice; 0.0 for empty
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[derive(Default)]
struct GroupAcc<'a> {
    amounts: Vec<f64>,
    payees: HashSet<&'a str>,
}

impl GroupAcc<'_> {
    fn total(&self) -> f64 {
        self.amounts.iter().sum()
    }
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct Analyzer {
    config: AnalysisConfig,
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new(AnalysisConfig::default())
    }
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Analyzer { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn by_party(&self, records: &[ReconciledRecord]) -> Vec<GroupStats> {
        group_stats(records, |r| r.affiliation.as_ref().map(|a| a.party_code.as_str()))
    }

    pub fn by_region(&self, records: &[ReconciledRecord]) -> Vec<GroupStats> {
        group_stats(records, |r| r.affiliation.as_ref().map(|a| a.region_code.as_str()))
    }

    /// Matched rows only; blank categories are left out
    pub fn by_category(&self, records: &[ReconciledRecord]) -> Vec<CategoryStats> {
        let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for r in records.iter().filter(|r| r.is_matched()) {
            if r.expense.category.is_empty() {
                continue;
            }
            groups
                .entry(r.expense.category.as_str())
                .or_default()
                .push(r.amount());
        }

        let totals: Vec<(&str, f64, usize)> = groups
            .iter()
            .map(|(k, v)| (*k, v.iter().sum::<f64>(), v.len()))
            .collect();
        let grand_total: f64 = totals.iter().map(|(_, t, _)| t).sum();

        let mut rows: Vec<CategoryStats> = totals
            .into_iter()
            .map(|(category, total, count)| CategoryStats {
                category: category.to_string(),
                total,
                mean: total / count as f64,
                count,
                percentage_of_grand_total: if grand_total > 0.0 {
                    round_to(total / grand_total * 100.0, self.config.percentage_decimals)
                } else {
                    0.0
                },
            })
            .collect();

        // Keys arrive ascending; the stable sort keeps that order for equal totals
        rows.sort_by(|a, b| b.total.total_cmp(&a.total));
        rows
    }

    /// Biggest spenders by (payee, party, region). Equal totals keep
    /// first-encounter order, so truncation at `n` is deterministic.
    pub fn top_payees(&self, records: &[ReconciledRecord], n: usize) -> Vec<PayeeTotal> {
        let mut positions: HashMap<(&str, &str, &str), usize> = HashMap::new();
        let mut rows: Vec<PayeeTotal> = Vec::new();

        for r in records.iter().filter(|r| r.is_matched()) {
            let key = (r.canonical_name.as_str(), r.party_code(), r.region_code());
            match positions.get(&key) {
                Some(&idx) => {
                    rows[idx].total += r.amount();
                    rows[idx].count += 1;
                }
                None => {
                    positions.insert(key, rows.len());
                    rows.push(PayeeTotal {
                        payee_name: r.canonical_name.clone(),
                        party_code: r.party_code().to_string(),
                        region_code: r.region_code().to_string(),
                        total: r.amount(),
                        count: 1,
                    });
                }
            }
        }

        rows.sort_by(|a, b| b.total.total_cmp(&a.total));
        rows.truncate(n);
        rows
    }

    pub fn full_report(&self, records: &[ReconciledRecord]) -> AnalysisReport {
        let report = AnalysisReport {
            by_party: self.by_party(records),
            by_region: self.by_region(records),
            by_category: self.by_category(records),
            top_payees: self.top_payees(records, self.config.top_n),
        };
        info!(
            "Aggregated {} parties, {} regions, {} categories, top {} payees",
            report.by_party.len(),
            report.by_region.len(),
            report.by_category.len(),
            report.top_payees.len()
        );
        report
    }
}

/// Shared shape of by-party and by-region: sorted by total desc, key asc
fn group_stats<'a, F>(records: &'a [ReconciledRecord], key_of: F) -> Vec<GroupStats>
where
    F: Fn(&'a ReconciledRecord) -> Option<&'a str>,
{
    let mut groups: BTreeMap<&str, GroupAcc> = BTreeMap::new();
    for r in records {
        if let Some(key) = key_of(r) {
            let acc = groups.entry(key).or_default();
            acc.amounts.push(r.amount());
            acc.payees.insert(r.canonical_name.as_str());
        }
    }

    let mut rows: Vec<GroupStats> = groups
        .into_iter()
        .map(|(key, acc)| {
            let total = acc.total();
            let count = acc.amounts.len();
            let distinct_payees = acc.payees.len();
            GroupStats {
                group_key: key.to_string(),
                total,
                mean: total / count as f64,
                median: median(&acc.amounts),
                count,
                distinct_payees,
                mean_per_payee: total / distinct_payees as f64,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.total.total_cmp(&a.total));
    rows
}

// ============================================================================
// DATASET SUMMARY (cleaned data, before reconciliation)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub records: usize,
    pub distinct_payees: usize,
    pub distinct_categories: usize,
    pub total: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// (category, records), most frequent first
    pub top_categories: Vec<(String, usize)>,
    /// (canonical payee, records), most frequent first
    pub top_payees: Vec<(String, usize)>,
}

impl DatasetSummary {
    pub const TOP: usize = 10;

    pub fn from_records(records: &[ExpenseRecord]) -> Self {
        let amounts: Vec<f64> = records.iter().map(|r| r.amount).collect();
        let total: f64 = amounts.iter().sum();

        let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
        let mut payees: BTreeMap<String, usize> = BTreeMap::new();
        for r in records {
            *categories.entry(r.category.as_str()).or_default() += 1;
            *payees.entry(normalize(&r.payee_name)).or_default() += 1;
        }

        DatasetSummary {
            records: records.len(),
            distinct_payees: payees.len(),
            distinct_categories: categories.len(),
            total,
            mean: if records.is_empty() { 0.0 } else { total / records.len() as f64 },
            median: median(&amounts),
            min: amounts.iter().copied().reduce(f64::min).unwrap_or(0.0),
            max: amounts.iter().copied().reduce(f64::max).unwrap_or(0.0),
            top_categories: most_frequent(categories.into_iter().map(|(k, v)| (k.to_string(), v))),
            top_payees: most_frequent(payees.into_iter()),
        }
    }
}

/// Input must be key-ascending; output is count desc, key asc, capped at TOP
fn most_frequent(counts: impl Iterator<Item = (String, usize)>) -> Vec<(String, usize)> {
    let mut v: Vec<(String, usize)> = counts.collect();
    v.sort_by(|a, b| b.1.cmp(&a.1));
    v.truncate(DatasetSummary::TOP);
    v
}

// ============================================================================
// FINDINGS (headline numbers for the console)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    pub matched_total: f64,
    pub matched_payees: usize,
    pub matched_records: usize,
    pub spend_per_payee: f64,
    pub top_parties: Vec<GroupStats>,
    pub top_regions: Vec<GroupStats>,
    pub top_categories: Vec<CategoryStats>,
    pub top_payees: Vec<PayeeTotal>,
}

impl Findings {
    pub const TOP: usize = 3;

    pub fn from_report(records: &[ReconciledRecord], report: &AnalysisReport) -> Self {
        let matched: Vec<&ReconciledRecord> = records.iter().filter(|r| r.is_matched()).collect();
        let matched_total: f64 = matched.iter().map(|r| r.amount()).sum();
        let matched_payees = matched
            .iter()
            .map(|r| r.canonical_name.as_str())
            .collect::<HashSet<_>>()
            .len();

        let head = |n: usize| n.min(Self::TOP);
        Findings {
            matched_total,
            matched_payees,
            matched_records: matched.len(),
            spend_per_payee: if matched_payees == 0 {
                0.0
            } else {
                matched_total / matched_payees as f64
            },
            top_parties: report.by_party[..head(report.by_party.len())].to_vec(),
            top_regions: report.by_region[..head(report.by_region.len())].to_vec(),
            top_categories: report.by_category[..head(report.by_category.len())].to_vec(),
            top_payees: report.top_payees[..head(report.top_payees.len())].to_vec(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
