// Property tests for normalization, cleaning and aggregation invariants

use expense_recon::{
    normalize, Affiliation, AnalysisConfig, Analyzer, CsvFormat, ExpenseRecord, RawRow, RawTable,
    ReconciledRecord, RecordLoader,
};
use proptest::prelude::*;
use std::path::PathBuf;

fn raw_row() -> impl Strategy<Value = (Option<String>, Option<String>, Option<String>)> {
    (
        proptest::option::of(prop::sample::select(vec!["Ana", "Bruno", "Clara"])),
        proptest::option::of(prop::sample::select(vec!["Fuel", "Travel"])),
        proptest::option::of(prop::sample::select(vec!["10,00", "-3,00", "0", "abc", "25,50"])),
    )
        .prop_map(|(p, c, a)| (p.map(String::from), c.map(String::from), a.map(String::from)))
}

fn reconciled(payee: &str, party: Option<&str>, category: &str, amount: f64) -> ReconciledRecord {
    ReconciledRecord {
        expense: ExpenseRecord::new(payee, category, amount),
        canonical_name: normalize(payee),
        affiliation: party.map(|p| Affiliation {
            party_code: p.to_string(),
            region_code: "SP".to_string(),
        }),
    }
}

fn reconciled_rows() -> impl Strategy<Value = Vec<ReconciledRecord>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["Ana", "Bruno", "Clara", "Davi"]),
            proptest::option::of(prop::sample::select(vec!["PA", "PB"])),
            prop::sample::select(vec!["Fuel", "Travel", "Meals"]),
            1u32..100_000u32,
        ),
        0..40,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(payee, party, category, cents)| {
                reconciled(payee, party, category, cents as f64 / 100.0)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn normalize_is_idempotent(name in "[a-zA-ZÀ-ÿ \t]{0,40}") {
        let once = normalize(&name);
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert!(!once.starts_with(' ') && !once.ends_with(' '));
        prop_assert!(!once.contains("  "));
    }

    #[test]
    fn cleaning_accounts_for_every_row(rows in prop::collection::vec(raw_row(), 0..30)) {
        let table = RawTable {
            source: PathBuf::from("generated.csv"),
            encoding: "UTF-8".to_string(),
            used_fallback: false,
            headers: vec![],
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, (payee, category, amount))| RawRow {
                    line_number: i as u64 + 2,
                    payee,
                    category,
                    amount,
                })
                .collect(),
        };

        let outcome = RecordLoader::new(CsvFormat::default()).clean(&table);
        let r = &outcome.report;

        prop_assert_eq!(r.raw_rows, table.rows.len());
        prop_assert_eq!(
            r.nulls_removed + r.invalid_removed + r.duplicates_removed + r.final_rows,
            r.raw_rows
        );
        prop_assert_eq!(outcome.records.len(), r.final_rows);
        prop_assert!(outcome.records.iter().all(|e| e.amount > 0.0));
    }

    #[test]
    fn category_percentages_sum_to_hundred(records in reconciled_rows()) {
        let categories = Analyzer::default().by_category(&records);
        if !categories.is_empty() {
            let sum: f64 = categories.iter().map(|c| c.percentage_of_grand_total).sum();
            // each share is rounded to two decimals
            prop_assert!((sum - 100.0).abs() <= 0.005 * categories.len() as f64 + 1e-9);
        }
    }

    #[test]
    fn top_payees_bounded_and_sorted(records in reconciled_rows(), n in 1usize..6) {
        let analyzer = Analyzer::new(AnalysisConfig::default());
        let top = analyzer.top_payees(&records, n);

        prop_assert!(top.len() <= n);
        prop_assert!(top.windows(2).all(|w| w[0].total >= w[1].total));
        prop_assert!(top.iter().all(|p| p.party_code != "UNMATCHED"));
    }
}
