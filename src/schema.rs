// 📐 Schema Upgrade - Bring older plugin tables to the current shape
//
// Every step checks the live schema before touching it, so the whole list can
// be replayed on any database: fresh, legacy, or already upgraded.

use crate::db::{MILESTONES_TABLE, TRAININGS_TABLE};
use crate::error::Result;
use rusqlite::{params, Connection};

// ============================================================================
// STEPS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStep {
    /// Rename a table when the old one exists and the new one does not
    RenameTable { from: &'static str, to: &'static str },

    /// Rename a column when the old one exists
    RenameColumn {
        table: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// Add a nullable column when the table exists and lacks it
    AddColumn {
        table: &'static str,
        column: &'static str,
        sql_type: &'static str,
    },

    /// Make a column unique when no unique index covers it yet
    /// Duplicate rows are dropped first, the lowest id of each value is kept
    UniqueColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Ordered upgrade path from the first released schema
pub const UPGRADE_STEPS: &[SchemaStep] = &[
    SchemaStep::RenameTable {
        from: "attestoodle_training",
        to: TRAININGS_TABLE,
    },
    SchemaStep::RenameTable {
        from: "attestoodle_milestone",
        to: MILESTONES_TABLE,
    },
    SchemaStep::RenameColumn {
        table: MILESTONES_TABLE,
        from: "milestone",
        to: "creditedtime",
    },
    SchemaStep::AddColumn {
        table: MILESTONES_TABLE,
        column: "trainingid",
        sql_type: "INTEGER",
    },
    SchemaStep::AddColumn {
        table: MILESTONES_TABLE,
        column: "timemodified",
        sql_type: "INTEGER",
    },
    SchemaStep::AddColumn {
        table: MILESTONES_TABLE,
        column: "course",
        sql_type: "INTEGER",
    },
    SchemaStep::AddColumn {
        table: MILESTONES_TABLE,
        column: "name",
        sql_type: "TEXT",
    },
    SchemaStep::AddColumn {
        table: TRAININGS_TABLE,
        column: "timecreated",
        sql_type: "INTEGER",
    },
    SchemaStep::UniqueColumn {
        table: TRAININGS_TABLE,
        column: "categoryid",
    },
];

impl SchemaStep {
    pub fn describe(&self) -> String {
        match self {
            SchemaStep::RenameTable { from, to } => format!("rename table {} -> {}", from, to),
            SchemaStep::RenameColumn { table, from, to } => {
                format!("rename column {}.{} -> {}", table, from, to)
            }
            SchemaStep::AddColumn { table, column, .. } => {
                format!("add column {}.{}", table, column)
            }
            SchemaStep::UniqueColumn { table, column } => {
                format!("unique index on {}.{}", table, column)
            }
        }
    }

    /// Apply the step if the schema needs it; returns whether anything changed
    pub fn apply(&self, conn: &Connection) -> Result<bool> {
        match *self {
            SchemaStep::RenameTable { from, to } => {
                if !table_exists(conn, from)? || table_exists(conn, to)? {
                    return Ok(false);
                }
                conn.execute_batch(&format!("ALTER TABLE \"{}\" RENAME TO \"{}\"", from, to))?;
            }
            SchemaStep::RenameColumn { table, from, to } => {
                if !column_exists(conn, table, from)? || column_exists(conn, table, to)? {
                    return Ok(false);
                }
                conn.execute_batch(&format!(
                    "ALTER TABLE \"{}\" RENAME COLUMN \"{}\" TO \"{}\"",
                    table, from, to
                ))?;
            }
            SchemaStep::AddColumn {
                table,
                column,
                sql_type,
            } => {
                if !table_exists(conn, table)? || column_exists(conn, table, column)? {
                    return Ok(false);
                }
                conn.execute_batch(&format!(
                    "ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}",
                    table, column, sql_type
                ))?;
            }
            SchemaStep::UniqueColumn { table, column } => {
                if !table_exists(conn, table)? || unique_index_exists(conn, table, column)? {
                    return Ok(false);
                }
                let removed = conn.execute(
                    &format!(
                        "DELETE FROM \"{t}\" WHERE id NOT IN (
                            SELECT MIN(id) FROM \"{t}\" GROUP BY \"{c}\"
                        )",
                        t = table,
                        c = column
                    ),
                    [],
                )?;
                if removed > 0 {
                    tracing::warn!(table, column, removed, "duplicate rows dropped");
                }
                conn.execute_batch(&format!(
                    "CREATE UNIQUE INDEX \"idx_{t}_{c}\" ON \"{t}\"(\"{c}\")",
                    t = table,
                    c = column
                ))?;
            }
        }
        Ok(true)
    }
}

// ============================================================================
// INTROSPECTION
// ============================================================================

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(1) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Whether a single-column unique index (or UNIQUE constraint) covers `column`
pub fn unique_index_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(1)
         FROM pragma_index_list(?1) AS il
         WHERE il.\"unique\" = 1
           AND (SELECT COUNT(1) FROM pragma_index_info(il.name)) = 1
           AND (SELECT name FROM pragma_index_info(il.name)) = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Run every upgrade step inside one transaction
///
/// Returns the descriptions of the steps that changed the schema.
pub fn upgrade_schema(conn: &mut Connection) -> Result<Vec<String>> {
    let tx = conn.transaction()?;
    let mut applied = Vec::new();

    for step in UPGRADE_STEPS {
        if step.apply(&tx)? {
            tracing::info!(step = %step.describe(), "schema step applied");
            applied.push(step.describe());
        } else {
            tracing::debug!(step = %step.describe(), "schema step skipped");
        }
    }

    tx.commit()?;
    Ok(applied)
}

// ============================================================================
// TESTS
// ============================================================================
