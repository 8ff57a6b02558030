use crate::category::CategoryId;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Plugin table listing the categories flagged as trainings
pub const TRAININGS_TABLE: &str = "tool_attestoodle_training";
/// Plugin table holding credited time per activity
pub const MILESTONES_TABLE: &str = "tool_attestoodle_milestone";

/// One row of `course_categories`, as consumed by the tree builder
/// `parent` is 0 for a root category
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "parent_or_root")]
    pub parent: i64,
}

/// An empty or null parent field reads as 0 (root)
fn parent_or_root<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

impl CategoryRow {
    pub fn new(id: i64, name: &str, description: &str, parent: i64) -> Self {
        CategoryRow {
            id,
            name: name.to_string(),
            description: description.to_string(),
            parent,
        }
    }

    pub fn category_id(&self) -> CategoryId {
        CategoryId(self.id)
    }

    pub fn parent_id(&self) -> Option<CategoryId> {
        CategoryId::parent_from_raw(self.parent)
    }
}

/// Row of the trainings table
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrainingRecord {
    pub id: i64,
    pub name: String,
    pub category_id: CategoryId,
    pub time_created: Option<i64>,
}

/// Credited time attached to an activity (course module)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Milestone {
    pub id: i64,
    /// Credited time, in minutes
    pub credited_time: i64,
    pub module_id: i64,
    pub training_id: Option<i64>,
    pub time_modified: Option<i64>,
    pub course: Option<i64>,
    pub name: Option<String>,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Course categories (owned by the host, mirrored here)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            description TEXT,
            parent INTEGER NOT NULL DEFAULT 0,
            path TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    // ==========================================================================
    // Trainings
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tool_attestoodle_training (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL DEFAULT '',
            categoryid INTEGER UNIQUE NOT NULL,
            timecreated INTEGER
        )",
        [],
    )?;

    // ==========================================================================
    // Milestones
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tool_attestoodle_milestone (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            creditedtime INTEGER NOT NULL,
            moduleid INTEGER NOT NULL,
            trainingid INTEGER,
            timemodified INTEGER,
            course INTEGER,
            name TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_categories_parent ON course_categories(parent)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_milestone_moduleid ON tool_attestoodle_milestone(moduleid)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// COURSE CATEGORIES
// ============================================================================

pub fn load_csv(csv_path: &Path) -> Result<Vec<CategoryRow>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: CategoryRow = result.context("Failed to deserialize category row")?;
        rows.push(row);
    }

    Ok(rows)
}

/// Insert category rows, skipping ids that already exist
///
/// The materialized `path` column ("/1/4/9") is derived from the parent's
/// path when the parent is already stored.
pub fn insert_categories(conn: &Connection, rows: &[CategoryRow]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for row in rows {
        let parent_path = match row.parent_id() {
            Some(parent) => conn
                .query_row(
                    "SELECT path FROM course_categories WHERE id = ?1",
                    [parent.get()],
                    |r| r.get::<_, String>(0),
                )
                .optional()?
                .unwrap_or_else(|| format!("/{}", parent)),
            None => String::new(),
        };
        let path = format!("{}/{}", parent_path, row.id);

        let result = conn.execute(
            "INSERT INTO course_categories (id, name, description, parent, path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.id, row.name, row.description, row.parent, path],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(inserted, duplicates, "category rows imported");

    Ok(inserted)
}

fn map_category_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CategoryRow> {
    let description: Option<String> = row.get(2)?;
    let parent: Option<i64> = row.get(3)?;

    Ok(CategoryRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: description.unwrap_or_default(),
        parent: parent.unwrap_or(0),
    })
}

/// Retrieves all the course categories
pub fn get_all_categories(conn: &Connection) -> Result<Vec<CategoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, parent
         FROM course_categories
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map([], map_category_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Retrieves the course categories with the given ids
pub fn get_categories_by_id(conn: &Connection, ids: &[CategoryId]) -> Result<Vec<CategoryRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT id, name, description, parent
         FROM course_categories
         WHERE id IN ({})
         ORDER BY id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(params_from_iter(ids.iter().map(|id| id.get())), map_category_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Retrieves the materialized path ("/1/4/9") of the given categories
pub fn get_categories_paths(
    conn: &Connection,
    ids: &[CategoryId],
) -> Result<Vec<(CategoryId, String)>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT id, path FROM course_categories WHERE id IN ({}) ORDER BY id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;

    let paths = stmt
        .query_map(params_from_iter(ids.iter().map(|id| id.get())), |row| {
            Ok((CategoryId(row.get(0)?), row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(paths)
}

/// Write a category description back, keyed by id
///
/// Only the description column is ever rewritten. An id unknown to the table
/// is inserted with an empty name.
pub fn update_category_description(
    conn: &Connection,
    id: CategoryId,
    description: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO course_categories (id, description) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET description = excluded.description",
        params![id.get(), description],
    )
    .with_context(|| format!("Failed to update description of category {}", id))?;

    Ok(())
}

// ============================================================================
// TRAININGS
// ============================================================================

pub fn get_all_trainings(conn: &Connection) -> Result<Vec<TrainingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, categoryid, timecreated
         FROM tool_attestoodle_training
         ORDER BY id",
    )?;

    let trainings = stmt
        .query_map([], |row| {
            Ok(TrainingRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                category_id: CategoryId(row.get(2)?),
                time_created: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(trainings)
}

/// Insert a training for a category; returns false if it already had one
pub fn insert_training(conn: &Connection, category_id: CategoryId) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tool_attestoodle_training (name, categoryid, timecreated)
         VALUES ('', ?1, ?2)",
        params![category_id.get(), Utc::now().timestamp()],
    )?;

    Ok(inserted > 0)
}

/// Delete the training of a category; returns the number of rows removed
pub fn delete_training(conn: &Connection, category_id: CategoryId) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM tool_attestoodle_training WHERE categoryid = ?1",
        [category_id.get()],
    )?;

    Ok(deleted)
}

// ============================================================================
// MILESTONES
// ============================================================================

pub fn get_all_milestones(conn: &Connection) -> Result<Vec<Milestone>> {
    let mut stmt = conn.prepare(
        "SELECT id, creditedtime, moduleid, trainingid, timemodified, course, name
         FROM tool_attestoodle_milestone
         ORDER BY id",
    )?;

    let milestones = stmt
        .query_map([], |row| {
            Ok(Milestone {
                id: row.get(0)?,
                credited_time: row.get(1)?,
                module_id: row.get(2)?,
                training_id: row.get(3)?,
                time_modified: row.get(4)?,
                course: row.get(5)?,
                name: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(milestones)
}

pub fn insert_milestone(
    conn: &Connection,
    module_id: i64,
    credited_time: i64,
    training_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO tool_attestoodle_milestone (creditedtime, moduleid, trainingid, timemodified)
         VALUES (?1, ?2, ?3, ?4)",
        params![credited_time, module_id, training_id, Utc::now().timestamp()],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Change the credited time of an activity; returns the number of rows touched
pub fn update_milestone(conn: &Connection, module_id: i64, credited_time: i64) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE tool_attestoodle_milestone
         SET creditedtime = ?1, timemodified = ?2
         WHERE moduleid = ?3",
        params![credited_time, Utc::now().timestamp(), module_id],
    )?;

    Ok(updated)
}

pub fn delete_milestone(conn: &Connection, module_id: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM tool_attestoodle_milestone WHERE moduleid = ?1",
        [module_id],
    )?;

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn sample_rows() -> Vec<CategoryRow> {
        vec![
            CategoryRow::new(1, "Math", "", 0),
            CategoryRow::new(2, "Algebra", "Letters", 1),
            CategoryRow::new(3, "Quadratics", "Squares", 2),
        ]
    }

    #[test]
    fn test_insert_categories_twice() {
        let conn = test_db();

        let inserted1 = insert_categories(&conn, &sample_rows()).unwrap();
        let inserted2 = insert_categories(&conn, &sample_rows()).unwrap();

        assert_eq!(inserted1, 3, "First import should insert 3 categories");
        assert_eq!(inserted2, 0, "Second import should skip every duplicate");
        assert_eq!(get_all_categories(&conn).unwrap().len(), 3);
    }

    #[test]
    fn test_get_all_categories_maps_null_columns() {
        let conn = test_db();
        conn.execute(
            "INSERT INTO course_categories (id, name, description, parent) VALUES (5, 'Bare', NULL, 0)",
            [],
        )
        .unwrap();

        let rows = get_all_categories(&conn).unwrap();
        assert_eq!(rows, vec![CategoryRow::new(5, "Bare", "", 0)]);
        assert_eq!(rows[0].parent_id(), None);
    }

    #[test]
    fn test_get_categories_by_id_and_paths() {
        let conn = test_db();
        insert_categories(&conn, &sample_rows()).unwrap();

        let rows = get_categories_by_id(&conn, &[CategoryId(3), CategoryId(1)]).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Math", "Quadratics"]);

        let paths = get_categories_paths(&conn, &[CategoryId(3)]).unwrap();
        assert_eq!(paths, vec![(CategoryId(3), "/1/2/3".to_string())]);

        assert!(get_categories_by_id(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_update_category_description_only_touches_description() {
        let conn = test_db();
        insert_categories(&conn, &sample_rows()).unwrap();

        update_category_description(&conn, CategoryId(2), "Rewritten").unwrap();

        let row = &get_categories_by_id(&conn, &[CategoryId(2)]).unwrap()[0];
        assert_eq!(row, &CategoryRow::new(2, "Algebra", "Rewritten", 1));
    }

    #[test]
    fn test_update_category_description_upserts_unknown_id() {
        let conn = test_db();

        update_category_description(&conn, CategoryId(40), "New").unwrap();

        let rows = get_all_categories(&conn).unwrap();
        assert_eq!(rows, vec![CategoryRow::new(40, "", "New", 0)]);
    }

    #[test]
    fn test_trainings_table() {
        let conn = test_db();

        assert!(insert_training(&conn, CategoryId(2)).unwrap());
        assert!(!insert_training(&conn, CategoryId(2)).unwrap());
        insert_training(&conn, CategoryId(7)).unwrap();

        let trainings = get_all_trainings(&conn).unwrap();
        assert_eq!(trainings.len(), 2);
        assert_eq!(trainings[0].category_id, CategoryId(2));
        assert!(trainings[0].time_created.is_some());

        assert_eq!(delete_training(&conn, CategoryId(2)).unwrap(), 1);
        assert_eq!(delete_training(&conn, CategoryId(2)).unwrap(), 0);
        assert_eq!(get_all_trainings(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_milestones_table() {
        let conn = test_db();

        insert_milestone(&conn, 31, 60, Some(1)).unwrap();
        insert_milestone(&conn, 32, 90, None).unwrap();

        assert_eq!(update_milestone(&conn, 31, 120).unwrap(), 1);
        assert_eq!(update_milestone(&conn, 99, 10).unwrap(), 0);

        let milestones = get_all_milestones(&conn).unwrap();
        assert_eq!(milestones.len(), 2);
        assert_eq!(milestones[0].credited_time, 120);
        assert_eq!(milestones[0].training_id, Some(1));
        assert!(milestones[0].time_modified.is_some());

        assert_eq!(delete_milestone(&conn, 32).unwrap(), 1);
        assert_eq!(get_all_milestones(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,name,description,parent").unwrap();
        writeln!(file, "1,Math,,0").unwrap();
        writeln!(
            file,
            "2,Algebra,\"Letters<span class=\"\"attestoodle_training\"\"></span>\",1"
        )
        .unwrap();

        let rows = load_csv(file.path()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], CategoryRow::new(1, "Math", "", 0));
        assert_eq!(
            rows[1].description,
            "Letters<span class=\"attestoodle_training\"></span>"
        );
        assert_eq!(rows[1].parent_id(), Some(CategoryId(1)));
    }

    #[test]
    fn test_load_csv_empty_parent_is_root() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,name,description,parent").unwrap();
        writeln!(file, "1,Math,Intro,").unwrap();
        writeln!(file, "2,Algebra,,1").unwrap();

        let rows = load_csv(file.path()).unwrap();

        assert_eq!(rows[0], CategoryRow::new(1, "Math", "Intro", 0));
        assert_eq!(rows[0].parent_id(), None);
        assert_eq!(rows[1].parent_id(), Some(CategoryId(1)));
    }

    #[test]
    fn test_insert_training_after_legacy_upgrade_dedupes() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE attestoodle_training (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL DEFAULT '',
                categoryid INTEGER NOT NULL
            );
            INSERT INTO attestoodle_training (name, categoryid) VALUES ('', 4);
            INSERT INTO attestoodle_training (name, categoryid) VALUES ('', 4);",
        )
        .unwrap();
        crate::schema::upgrade_schema(&mut conn).unwrap();
        setup_database(&conn).unwrap();

        assert_eq!(get_all_trainings(&conn).unwrap().len(), 1);
        assert!(!insert_training(&conn, CategoryId(4)).unwrap());
        assert!(insert_training(&conn, CategoryId(5)).unwrap());
        assert!(!insert_training(&conn, CategoryId(5)).unwrap());
        assert_eq!(get_all_trainings(&conn).unwrap().len(), 2);
    }
}
