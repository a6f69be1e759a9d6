// 🧾 Output Tables - column name → values, order-preserving
// Report consumers (CSV writer, SQLite export) only ever see Tables.

use crate::analysis::{round_to, CategoryStats, GroupStats, PayeeTotal};
use crate::reconcile::ReconciledRecord;
use anyhow::{bail, Result};
use serde::Serialize;
use std::io;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Integer(i64),
}

impl Cell {
    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Integer(i) => i.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Integer(i) => Some(*i as f64),
            Cell::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

fn count(n: usize) -> Cell {
    Cell::Integer(n as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: &str, column_names: &[&str]) -> Self {
        Table {
            name: name.to_string(),
            columns: column_names
                .iter()
                .map(|c| Column {
                    name: c.to_string(),
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "table {}: row has {} cells, expected {}",
                self.name,
                row.len(),
                self.columns.len()
            );
        }
        for (column, cell) in self.columns.iter_mut().zip(row) {
            column.values.push(cell);
        }
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        if index >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }

    pub fn write_csv<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<()> {
        writer.write_record(self.column_names())?;
        for i in 0..self.row_count() {
            writer.write_record(self.columns.iter().map(|c| c.values[i].render()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

// ============================================================================
// BUILDERS (one per output table)
// ============================================================================

pub const RECONCILED_COLUMNS: [&str; 6] = [
    "payee_name",
    "canonical_name",
    "category",
    "amount",
    "party_code",
    "region_code",
];

pub fn reconciled_table(records: &[ReconciledRecord], decimals: u32) -> Result<Table> {
    let mut table = Table::new("reconciled", &RECONCILED_COLUMNS);
    for r in records {
        table.push_row(vec![
            text(&r.expense.payee_name),
            text(&r.canonical_name),
            text(&r.expense.category),
            Cell::Number(round_to(r.amount(), decimals)),
            text(r.party_code()),
            text(r.region_code()),
        ])?;
    }
    Ok(table)
}

/// by_party / by_region share a shape; only the key column name differs
pub fn group_table(name: &str, key_column: &str, rows: &[GroupStats], decimals: u32) -> Result<Table> {
    let mut table = Table::new(
        name,
        &[
            key_column,
            "total",
            "mean",
            "median",
            "count",
            "distinct_payees",
            "mean_per_payee",
        ],
    );
    for g in rows {
        table.push_row(vec![
            text(&g.group_key),
            Cell::Number(round_to(g.total, decimals)),
            Cell::Number(round_to(g.mean, decimals)),
            Cell::Number(round_to(g.median, decimals)),
            count(g.count),
            count(g.distinct_payees),
            Cell::Number(round_to(g.mean_per_payee, decimals)),
        ])?;
    }
    Ok(table)
}

pub fn category_table(rows: &[CategoryStats], decimals: u32) -> Result<Table> {
    let mut table = Table::new(
        "by_category",
        &["category", "total", "mean", "count", "percentage_of_grand_total"],
    );
    for c in rows {
        table.push_row(vec![
            text(&c.category),
            Cell::Number(round_to(c.total, decimals)),
            Cell::Number(round_to(c.mean, decimals)),
            count(c.count),
            Cell::Number(c.percentage_of_grand_total),
        ])?;
    }
    Ok(table)
}

pub fn payee_table(rows: &[PayeeTotal], decimals: u32) -> Result<Table> {
    let mut table = Table::new(
        "top_payees",
        &["payee_name", "party_code", "region_code", "total", "count"],
    );
    for p in rows {
        table.push_row(vec![
            text(&p.payee_name),
            text(&p.party_code),
            text(&p.region_code),
            Cell::Number(round_to(p.total, decimals)),
            count(p.count),
        ])?;
    }
    Ok(table)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_row_and_lookup() {
        let mut table = Table::new("t", &["a", "b"]);
        table.push_row(vec![text("x"), Cell::Number(1.5)]).unwrap();
        table.push_row(vec![text("y"), Cell::Integer(2)]).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.column("b").unwrap()[0].as_f64(), Some(1.5));
        assert_eq!(table.row(1).unwrap()[0].as_str(), Some("y"));
        assert!(table.row(2).is_none());
        assert!(table.column("c").is_none());
    }

    #[test]
    fn test_push_row_wrong_width() {
        let mut table = Table::new("t", &["a", "b"]);
        assert!(table.push_row(vec![text("only one")]).is_err());
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_write_csv() {
        let mut table = Table::new("t", &["name", "total", "count"]);
        table
            .push_row(vec![text("PA; SP"), Cell::Number(100.5), Cell::Integer(3)])
            .unwrap();

        let mut writer = csv::Writer::from_writer(Vec::new());
        table.write_csv(&mut writer).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(out, "name,total,count\nPA; SP,100.5,3\n");
    }

    #[test]
    fn test_group_table_rounds() {
        let rows = vec![GroupStats {
            group_key: "PA".to_string(),
            total: 100.0 / 3.0,
            mean: 1.0 / 3.0,
            median: 0.125,
            count: 3,
            distinct_payees: 1,
            mean_per_payee: 100.0 / 3.0,
        }];
        let table = group_table("by_party", "party_code", &rows, 2).unwrap();

        assert_eq!(table.column_names()[0], "party_code");
        assert_eq!(table.column("total").unwrap()[0], Cell::Number(33.33));
        assert_eq!(table.column("mean").unwrap()[0], Cell::Number(0.33));
        assert_eq!(table.column("median").unwrap()[0], Cell::Number(0.13));
        assert_eq!(table.column("count").unwrap()[0], Cell::Integer(3));
    }

    #[test]
    fn test_cell_serializes_untagged() {
        let json = serde_json::to_string(&vec![text("a"), Cell::Number(1.5), Cell::Integer(2)]).unwrap();
        assert_eq!(json, r#"["a",1.5,2]"#);
    }
}
