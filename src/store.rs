// 🗄️ SQLite Export - one table per output Table + a runs audit table
// Write-only sink: the pipeline never reads back from here.

use crate::report::RunSummary;
use crate::table::{Cell, Table};
use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;

pub fn export_sqlite(path: &Path, tables: &[Table], summary: &RunSummary) -> Result<()> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
    setup_database(&conn)?;

    let tx = conn.transaction()?;
    for table in tables {
        write_table(&tx, table)?;
    }
    insert_run(&tx, summary)?;
    tx.commit()?;

    Ok(())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            input TEXT NOT NULL,
            raw_rows INTEGER NOT NULL,
            final_rows INTEGER NOT NULL,
            matched INTEGER NOT NULL,
            unmatched INTEGER NOT NULL,
            match_rate REAL NOT NULL,
            summary TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    Ok(())
}

/// SQLite column type from the first non-empty cell
fn column_type(values: &[Cell]) -> &'static str {
    match values.first() {
        Some(Cell::Number(_)) => "REAL",
        Some(Cell::Integer(_)) => "INTEGER",
        _ => "TEXT",
    }
}

/// Identifiers come from our own fixed column sets; quoting guards the rest
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn write_table(conn: &Connection, table: &Table) -> Result<()> {
    let columns = table.columns();
    let defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), column_type(&c.values)))
        .collect();

    conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table.name)), [])?;
    conn.execute(
        &format!(
            "CREATE TABLE {} (row_index INTEGER PRIMARY KEY, {})",
            quote_ident(&table.name),
            defs.join(", ")
        ),
        [],
    )?;

    let placeholders: Vec<String> = (1..=columns.len() + 1).map(|i| format!("?{}", i)).collect();
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(&table.name),
        placeholders.join(", ")
    ))?;

    for i in 0..table.row_count() {
        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(columns.len() + 1);
        values.push(rusqlite::types::Value::Integer(i as i64));
        for column in columns {
            values.push(match &column.values[i] {
                Cell::Text(s) => rusqlite::types::Value::Text(s.clone()),
                Cell::Number(n) => rusqlite::types::Value::Real(*n),
                Cell::Integer(n) => rusqlite::types::Value::Integer(*n),
            });
        }
        stmt.execute(params_from_iter(values))
            .with_context(|| format!("Failed to insert row {} into {}", i, table.name))?;
    }

    Ok(())
}

fn insert_run(conn: &Connection, summary: &RunSummary) -> Result<()> {
    let summary_json = serde_json::to_string(summary)?;
    conn.execute(
        "INSERT INTO runs (
            run_id, started_at, finished_at, input, raw_rows, final_rows,
            matched, unmatched, match_rate, summary
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            summary.run_id,
            summary.started_at.to_rfc3339(),
            summary.finished_at.to_rfc3339(),
            summary.input.display().to_string(),
            summary.cleaning.raw_rows as i64,
            summary.cleaning.final_rows as i64,
            summary.reconciliation.matched as i64,
            summary.reconciliation.unmatched as i64,
            summary.reconciliation.match_rate,
            summary_json,
        ],
    )?;
    Ok(())
}

/// Row count of an exported table
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================
