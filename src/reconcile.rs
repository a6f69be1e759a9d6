// ⚖️ Reconciliation Engine - Attach party/region to every expense
// Left-outer join on canonical name:
//   every cleaned ExpenseRecord → exactly one ReconciledRecord (same order)
//   no roster hit → UNMATCHED, never dropped

use crate::loader::ExpenseRecord;
use crate::normalize::normalize;
use crate::roster::LegislatorRecord;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Sentinel for party/region when the payee is not in the roster
pub const UNMATCHED: &str = "UNMATCHED";

// ============================================================================
// AFFILIATION + RECONCILED RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Affiliation {
    pub party_code: String,
    pub region_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub expense: ExpenseRecord,
    pub canonical_name: String,
    /// `None` when no roster entry matched
    pub affiliation: Option<Affiliation>,
}

impl ReconciledRecord {
    pub fn is_matched(&self) -> bool {
        self.affiliation.is_some()
    }

    pub fn party_code(&self) -> &str {
        self.affiliation
            .as_ref()
            .map(|a| a.party_code.as_str())
            .unwrap_or(UNMATCHED)
    }

    pub fn region_code(&self) -> &str {
        self.affiliation
            .as_ref()
            .map(|a| a.region_code.as_str())
            .unwrap_or(UNMATCHED)
    }

    pub fn amount(&self) -> f64 {
        self.expense.amount
    }
}

// ============================================================================
// ROSTER INDEX
// ============================================================================

/// Two roster entries collapsing to the same canonical name.
/// First-seen wins; this records what was discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterAmbiguity {
    pub canonical_name: String,
    pub kept: LegislatorRecord,
    pub discarded: LegislatorRecord,
}

/// canonical name → affiliation
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    entries: HashMap<String, Affiliation>,
    ambiguities: Vec<RosterAmbiguity>,
}

impl RosterIndex {
    pub fn build(roster: &[LegislatorRecord]) -> Self {
        let mut entries = HashMap::with_capacity(roster.len());
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        let mut ambiguities = Vec::new();

        for (i, legislator) in roster.iter().enumerate() {
            let key = normalize(&legislator.full_name);
            if key.is_empty() {
                continue;
            }

            if let Some(&kept_idx) = first_seen.get(&key) {
                warn!(
                    "Roster ambiguity: '{}' and '{}' both normalize to '{}'; keeping the first",
                    roster[kept_idx].full_name, legislator.full_name, key
                );
                ambiguities.push(RosterAmbiguity {
                    canonical_name: key,
                    kept: roster[kept_idx].clone(),
                    discarded: legislator.clone(),
                });
                continue;
            }

            first_seen.insert(key.clone(), i);
            entries.insert(
                key,
                Affiliation {
                    party_code: legislator.party_code.clone(),
                    region_code: legislator.region_code.clone(),
                },
            );
        }

        RosterIndex {
            entries,
            ambiguities,
        }
    }

    pub fn lookup(&self, canonical_name: &str) -> Option<&Affiliation> {
        self.entries.get(canonical_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ambiguities(&self) -> &[RosterAmbiguity] {
        &self.ambiguities
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub total_records: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Percentage of records matched (0 for empty input)
    pub match_rate: f64,
    /// Distinct canonical names without a roster entry, first-seen order
    pub unmatched_payees: Vec<String>,
    pub ambiguities: Vec<RosterAmbiguity>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "Reconciled {} records: {} matched ({:.1}%), {} unmatched across {} payees, {} roster ambiguities",
            self.total_records,
            self.matched,
            self.match_rate,
            self.unmatched,
            self.unmatched_payees.len(),
            self.ambiguities.len()
        )
    }

    pub fn is_fully_matched(&self) -> bool {
        self.unmatched == 0
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub records: Vec<ReconciledRecord>,
    pub report: ReconciliationReport,
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    index: RosterIndex,
}

impl Reconciler {
    pub fn new(roster: &[LegislatorRecord]) -> Self {
        Reconciler {
            index: RosterIndex::build(roster),
        }
    }

    pub fn index(&self) -> &RosterIndex {
        &self.index
    }

    pub fn reconcile(&self, expenses: &[ExpenseRecord]) -> Reconciliation {
        let mut records = Vec::with_capacity(expenses.len());
        let mut unmatched_payees = Vec::new();
        let mut unmatched_seen = HashSet::new();
        let mut matched = 0;

        for expense in expenses {
            let canonical_name = normalize(&expense.payee_name);
            let affiliation = self.index.lookup(&canonical_name).cloned();

            if affiliation.is_some() {
                matched += 1;
            } else if unmatched_seen.insert(canonical_name.clone()) {
                unmatched_payees.push(canonical_name.clone());
            }

            records.push(ReconciledRecord {
                expense: expense.clone(),
                canonical_name,
                affiliation,
            });
        }

        let total_records = records.len();
        let match_rate = if total_records == 0 {
            0.0
        } else {
            matched as f64 / total_records as f64 * 100.0
        };

        let report = ReconciliationReport {
            total_records,
            matched,
            unmatched: total_records - matched,
            match_rate,
            unmatched_payees,
            ambiguities: self.index.ambiguities().to_vec(),
        };

        info!("{}", report.summary());

        Reconciliation { records, report }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn expense(name: &str, category: &str, amount: f64) -> ExpenseRecord {
        ExpenseRecord::new(name, category, amount)
    }

    #[test]
    fn test_accent_insensitive_match() {
        let reconciler = Reconciler::new(&[LegislatorRecord::new("José Silva", "PA", "SP")]);
        let result = reconciler.reconcile(&[expense("JOSE  SILVA", "Fuel", 100.0)]);

        let record = &result.records[0];
        assert!(record.is_matched());
        assert_eq!(record.canonical_name, "JOSE SILVA");
        assert_eq!(record.party_code(), "PA");
        assert_eq!(record.region_code(), "SP");
        assert_eq!(record.expense.payee_name, "JOSE  SILVA");
    }

    #[test]
    fn test_unmatched_rows_are_kept() {
        let reconciler = Reconciler::new(&[LegislatorRecord::new("José Silva", "PA", "SP")]);
        let result = reconciler.reconcile(&[
            expense("Maria Souza", "Fuel", 10.0),
            expense("José Silva", "Fuel", 20.0),
            expense("maria souza", "Travel", 30.0),
            expense("Pedro", "Fuel", 5.0),
        ]);

        assert_eq!(result.records.len(), 4);
        assert_eq!(result.records[0].party_code(), UNMATCHED);
        assert_eq!(result.records[0].region_code(), UNMATCHED);

        let report = &result.report;
        assert_eq!(report.total_records, 4);
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched, 3);
        assert!((report.match_rate - 25.0).abs() < 1e-9);
        assert_eq!(
            report.unmatched_payees,
            vec!["MARIA SOUZA".to_string(), "PEDRO".to_string()]
        );
        assert!(!report.is_fully_matched());
    }

    #[test]
    fn test_first_seen_wins_on_collision() {
        let roster = vec![
            LegislatorRecord::new("João Souza", "PA", "SP"),
            LegislatorRecord::new("JOAO SOUZA", "PB", "RJ"),
            LegislatorRecord::new("Ana", "PC", "MG"),
        ];
        let reconciler = Reconciler::new(&roster);

        assert_eq!(reconciler.index().len(), 2);
        let ambiguities = reconciler.index().ambiguities();
        assert_eq!(ambiguities.len(), 1);
        assert_eq!(ambiguities[0].canonical_name, "JOAO SOUZA");
        assert_eq!(ambiguities[0].kept.party_code, "PA");
        assert_eq!(ambiguities[0].discarded.party_code, "PB");

        let result = reconciler.reconcile(&[expense("joão souza", "X", 1.0)]);
        assert_eq!(result.records[0].party_code(), "PA");
        assert_eq!(result.report.ambiguities.len(), 1);
    }

    #[test]
    fn test_blank_roster_names_not_indexed() {
        let reconciler = Reconciler::new(&[LegislatorRecord::new("   ", "PA", "SP")]);
        assert!(reconciler.index().is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        let result = Reconciler::new(&[]).reconcile(&[]);
        assert!(result.records.is_empty());
        assert_eq!(result.report.match_rate, 0.0);
        assert!(result.report.is_fully_matched());
    }

    #[test]
    fn test_deterministic_output() {
        let roster = vec![
            LegislatorRecord::new("A", "P1", "R1"),
            LegislatorRecord::new("B", "P2", "R2"),
        ];
        let expenses: Vec<ExpenseRecord> = (0..50)
            .map(|i| expense(["a", "b", "c", "d"][i % 4], "X", i as f64 + 1.0))
            .collect();

        let first = Reconciler::new(&roster).reconcile(&expenses);
        let second = Reconciler::new(&roster).reconcile(&expenses);

        assert_eq!(first.records, second.records);
        assert_eq!(first.report, second.report);
        assert_eq!(
            serde_json::to_string(&first.records).unwrap(),
            serde_json::to_string(&second.records).unwrap()
        );
    }
}
