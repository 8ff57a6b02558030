// 🌳 Category Tree Builder - Flat category rows to a linked tree
//
// Rows come in any order, so a child may name a parent whose own row has not
// been read yet. The build runs in two phases:
// 1. Ensure: every row id and every positive parent id gets an entry
// 2. Feed: each row populates its entry and links its parent by id
// Parents that never get a row of their own stay bare placeholders.

use crate::category::{extract_training, CategoryId};
use crate::db::{self, CategoryRow};
use crate::error::{self, CatalogError};
use crate::store::CategoryStore;
use crate::training::TrainingRegistry;
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

// ============================================================================
// BUILD REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    /// Rows processed
    pub rows: usize,
    /// Entries added to the store by this build
    pub created: usize,
    /// Parent ids referenced by some row but never fed
    pub placeholders: Vec<CategoryId>,
    /// Categories registered as trainings, in row order
    pub trainings: Vec<CategoryId>,
}

// ============================================================================
// TREE BUILDER
// ============================================================================

pub struct CategoryTreeBuilder<'a> {
    store: &'a mut CategoryStore,
    trainings: &'a mut TrainingRegistry,
}

impl<'a> CategoryTreeBuilder<'a> {
    pub fn new(store: &'a mut CategoryStore, trainings: &'a mut TrainingRegistry) -> Self {
        CategoryTreeBuilder { store, trainings }
    }

    /// Phase 1: make sure every id a row mentions has an entry
    pub fn ensure_entries(&mut self, rows: &[CategoryRow]) {
        for row in rows {
            self.store.retrieve_or_create(row.category_id());
            if let Some(parent_id) = row.parent_id() {
                self.store.retrieve_or_create(parent_id);
            }
        }
    }

    /// Phase 2: feed every row into its entry and register trainings
    ///
    /// Returns the ids registered as trainings.
    pub fn feed_rows(&mut self, rows: &[CategoryRow]) -> Vec<CategoryId> {
        let mut trainings = Vec::new();

        for row in rows {
            let is_training = extract_training(&row.description);
            let parent = row.parent_id().map(|parent_id| {
                self.store.retrieve_or_create(parent_id);
                parent_id
            });

            let handle = self.store.retrieve_or_create(row.category_id());
            let category = self.store.get_mut(handle);
            category.feed(row.name.clone(), row.description.clone(), parent);

            if is_training {
                self.trainings.create_from_category(category);
                trainings.push(category.id());
            }
        }

        trainings
    }

    /// Run both phases over the full row set
    pub fn build(&mut self, rows: &[CategoryRow]) -> BuildReport {
        let before = self.store.len();

        self.ensure_entries(rows);
        let trainings = self.feed_rows(rows);

        let placeholders: Vec<CategoryId> = self
            .store
            .all()
            .filter(|category| !category.is_fed())
            .map(|category| category.id())
            .collect();

        let report = BuildReport {
            rows: rows.len(),
            created: self.store.len() - before,
            placeholders,
            trainings,
        };

        tracing::info!(
            rows = report.rows,
            created = report.created,
            placeholders = report.placeholders.len(),
            trainings = report.trainings.len(),
            "category tree built"
        );
        for placeholder in &report.placeholders {
            tracing::warn!(category = %placeholder, "parent category has no row of its own");
        }

        report
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// Store and training registry built from one read of the categories table
#[derive(Debug, Default)]
pub struct Catalog {
    pub store: CategoryStore,
    pub trainings: TrainingRegistry,
    pub report: BuildReport,
}

/// Flattened, serializable view of a fed category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub id: CategoryId,
    pub name: String,
    pub hierarchy: String,
    pub parent: Option<CategoryId>,
    pub is_training: bool,
    /// The category itself or its nearest ancestor flagged as a training
    pub training: Option<CategoryId>,
}

impl Catalog {
    /// Views of every fed category, in store order (placeholders are skipped)
    pub fn category_views(&self) -> error::Result<Vec<CategoryView>> {
        self.store
            .all()
            .filter(|category| category.is_fed())
            .map(|category| {
                Ok(CategoryView {
                    id: category.id(),
                    name: category.name().to_string(),
                    hierarchy: self.store.hierarchy(category.id())?,
                    parent: category.parent(),
                    is_training: category.is_training(),
                    training: self
                        .trainings
                        .owning_training(&self.store, category.id())?
                        .map(|training| training.category_id),
                })
            })
            .collect()
    }
}

/// Fetch every category row once, then build the tree
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let rows = db::get_all_categories(conn)?;

    let mut store = CategoryStore::new();
    let mut trainings = TrainingRegistry::new();
    let report = CategoryTreeBuilder::new(&mut store, &mut trainings).build(&rows);

    Ok(Catalog {
        store,
        trainings,
        report,
    })
}

/// Set the training flag of a category and persist it
///
/// When the flag changes, the new description and the trainings table are
/// written in one transaction and the registry is updated. Returns `false`
/// (and writes nothing) when the category already had that flag.
pub fn set_training_flag(
    conn: &mut Connection,
    store: &mut CategoryStore,
    trainings: &mut TrainingRegistry,
    id: CategoryId,
    is_training: bool,
) -> Result<bool> {
    let category = store
        .lookup_mut(id)
        .ok_or(CatalogError::CategoryNotFound(id))?;
    if !category.is_fed() {
        return Err(CatalogError::CategoryNotFed(id).into());
    }

    let previous = category.description().to_string();
    if !category.set_training(is_training) {
        tracing::debug!(category = %id, is_training, "training flag unchanged");
        return Ok(false);
    }

    let persisted = (|| -> Result<()> {
        let tx = conn.transaction()?;
        db::update_category_description(&tx, id, category.description())?;
        if is_training {
            db::insert_training(&tx, id)?;
        } else {
            db::delete_training(&tx, id)?;
        }
        tx.commit()?;
        Ok(())
    })();

    if let Err(e) = persisted {
        category.set_description(previous);
        return Err(e);
    }

    if is_training {
        trainings.create_from_category(category);
    } else {
        trainings.remove(id);
    }
    tracing::info!(category = %id, is_training, "training flag persisted");

    Ok(true)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::TRAINING_MARKER;
    use crate::db::{get_all_trainings, get_categories_by_id, insert_categories, setup_database};

    fn build(rows: &[CategoryRow]) -> (CategoryStore, TrainingRegistry, BuildReport) {
        let mut store = CategoryStore::new();
        let mut trainings = TrainingRegistry::new();
        let report = CategoryTreeBuilder::new(&mut store, &mut trainings).build(rows);
        (store, trainings, report)
    }

    fn math_rows() -> Vec<CategoryRow> {
        vec![
            CategoryRow::new(1, "Math", "", 0),
            CategoryRow::new(2, "Algebra", &format!("Letters{}", TRAINING_MARKER), 1),
            CategoryRow::new(3, "Quadratics", "Squares", 2),
        ]
    }

    #[test]
    fn test_build_three_level_hierarchy() {
        let (store, _, report) = build(&math_rows());

        assert_eq!(
            store.hierarchy(CategoryId(3)).unwrap(),
            "Math / Algebra / Quadratics"
        );
        assert_eq!(report.rows, 3);
        assert_eq!(report.created, 3);
        assert!(report.placeholders.is_empty());
    }

    #[test]
    fn test_build_child_before_parent() {
        let mut rows = math_rows();
        rows.reverse();

        let (store, _, report) = build(&rows);

        assert_eq!(
            store.hierarchy(CategoryId(3)).unwrap(),
            "Math / Algebra / Quadratics"
        );
        assert!(store.all().all(|c| c.is_fed()));
        assert!(report.placeholders.is_empty());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_build_tree_integrity() {
        let rows = vec![
            CategoryRow::new(10, "Leaf", "", 7),
            CategoryRow::new(4, "Root", "", 0),
            CategoryRow::new(7, "Middle", "", 4),
            CategoryRow::new(8, "Sibling", "", 4),
        ];

        let (store, _, _) = build(&rows);

        for row in &rows {
            let category = store.lookup(row.category_id()).unwrap();
            match row.parent_id() {
                Some(parent_id) => {
                    let parent = store.parent_of(category).unwrap();
                    assert_eq!(parent.id(), parent_id);
                }
                None => assert!(category.is_root()),
            }
        }
    }

    #[test]
    fn test_build_unknown_parent_becomes_placeholder() {
        let rows = vec![CategoryRow::new(2, "Orphan", "", 99)];

        let (store, _, report) = build(&rows);

        assert_eq!(report.placeholders, vec![CategoryId(99)]);
        assert_eq!(report.created, 2);
        let placeholder = store.lookup(CategoryId(99)).unwrap();
        assert!(!placeholder.is_fed());
        assert_eq!(placeholder.name(), "");
        assert_eq!(store.hierarchy(CategoryId(2)).unwrap(), " / Orphan");
    }

    #[test]
    fn test_build_registers_trainings() {
        let rows = vec![
            CategoryRow::new(1, "Math", "", 0),
            CategoryRow::new(2, "Algebra", &format!("x{}", TRAINING_MARKER), 1),
            CategoryRow::new(3, "Art", "<span class='ATTESTOODLE_TRAINING'></span>", 0),
        ];

        let (store, trainings, report) = build(&rows);

        assert_eq!(report.trainings, vec![CategoryId(2), CategoryId(3)]);
        assert_eq!(trainings.len(), 2);
        assert_eq!(trainings.find_by_category(CategoryId(2)).unwrap().name, "Algebra");
        assert!(store.lookup(CategoryId(2)).unwrap().is_training());
        assert!(!store.lookup(CategoryId(1)).unwrap().is_training());
    }

    #[test]
    fn test_load_catalog_from_database() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_categories(&conn, &math_rows()).unwrap();

        let catalog = load_catalog(&conn).unwrap();

        assert_eq!(catalog.store.len(), 3);
        assert_eq!(catalog.report.trainings, vec![CategoryId(2)]);
        assert_eq!(
            catalog.store.hierarchy(CategoryId(3)).unwrap(),
            "Math / Algebra / Quadratics"
        );
    }

    #[test]
    fn test_category_views_skip_placeholders() {
        let mut catalog = Catalog::default();
        let rows = vec![
            CategoryRow::new(2, "Algebra", &format!("x{}", TRAINING_MARKER), 1),
            CategoryRow::new(5, "Orphan", "", 99),
            CategoryRow::new(1, "Math", "", 0),
        ];
        CategoryTreeBuilder::new(&mut catalog.store, &mut catalog.trainings).build(&rows);

        let views = catalog.category_views().unwrap();

        let summary: Vec<(i64, &str, bool)> = views
            .iter()
            .map(|v| (v.id.get(), v.hierarchy.as_str(), v.is_training))
            .collect();
        assert_eq!(
            summary,
            vec![(2, "Math / Algebra", true), (1, "Math", false), (5, " / Orphan", false)]
        );
    }

    #[test]
    fn test_category_views_resolve_owning_training() {
        let mut catalog = Catalog::default();
        CategoryTreeBuilder::new(&mut catalog.store, &mut catalog.trainings).build(&math_rows());

        let views = catalog.category_views().unwrap();

        let owners: Vec<(i64, Option<CategoryId>)> =
            views.iter().map(|v| (v.id.get(), v.training)).collect();
        assert_eq!(
            owners,
            vec![(1, None), (2, Some(CategoryId(2))), (3, Some(CategoryId(2)))]
        );
    }

    #[test]
    fn test_set_training_flag_persists() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_categories(&conn, &[CategoryRow::new(1, "Intro", "Intro course", 0)]).unwrap();
        let mut catalog = load_catalog(&conn).unwrap();

        let changed = set_training_flag(
            &mut conn,
            &mut catalog.store,
            &mut catalog.trainings,
            CategoryId(1),
            true,
        )
        .unwrap();

        assert!(changed);
        let row = &get_categories_by_id(&conn, &[CategoryId(1)]).unwrap()[0];
        assert_eq!(
            row.description,
            "Intro course<span class=\"attestoodle_training\"></span>"
        );
        assert_eq!(get_all_trainings(&conn).unwrap().len(), 1);
        assert!(catalog.trainings.find_by_category(CategoryId(1)).is_some());

        let changed = set_training_flag(
            &mut conn,
            &mut catalog.store,
            &mut catalog.trainings,
            CategoryId(1),
            false,
        )
        .unwrap();

        assert!(changed);
        let row = &get_categories_by_id(&conn, &[CategoryId(1)]).unwrap()[0];
        assert_eq!(row.description, "Intro course");
        assert!(get_all_trainings(&conn).unwrap().is_empty());
        assert!(catalog.trainings.is_empty());
    }

    #[test]
    fn test_set_training_flag_rolls_back_on_write_failure() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_categories(&conn, &[CategoryRow::new(1, "Intro", "Intro course", 0)]).unwrap();
        let mut catalog = load_catalog(&conn).unwrap();
        conn.execute_batch("DROP TABLE tool_attestoodle_training").unwrap();

        let result = set_training_flag(
            &mut conn,
            &mut catalog.store,
            &mut catalog.trainings,
            CategoryId(1),
            true,
        );

        assert!(result.is_err());
        let category = catalog.store.lookup(CategoryId(1)).unwrap();
        assert_eq!(category.description(), "Intro course");
        assert!(!category.is_training());
        let row = &get_categories_by_id(&conn, &[CategoryId(1)]).unwrap()[0];
        assert_eq!(row.description, "Intro course");
        assert!(catalog.trainings.is_empty());
    }

    #[test]
    fn test_set_training_flag_unchanged_writes_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let description = format!("Ready{}", TRAINING_MARKER);
        insert_categories(&conn, &[CategoryRow::new(1, "Ready", &description, 0)]).unwrap();
        let mut catalog = load_catalog(&conn).unwrap();

        let changed = set_training_flag(
            &mut conn,
            &mut catalog.store,
            &mut catalog.trainings,
            CategoryId(1),
            true,
        )
        .unwrap();

        assert!(!changed);
        assert_eq!(
            catalog.store.lookup(CategoryId(1)).unwrap().description(),
            description
        );
        assert!(get_all_trainings(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_set_training_flag_rejects_unknown_and_placeholder() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let (mut store, mut trainings, _) = build(&[CategoryRow::new(2, "Orphan", "", 99)]);

        let unknown = set_training_flag(&mut conn, &mut store, &mut trainings, CategoryId(5), true)
            .unwrap_err();
        assert!(matches!(
            unknown.downcast_ref::<CatalogError>(),
            Some(CatalogError::CategoryNotFound(CategoryId(5)))
        ));

        let placeholder =
            set_training_flag(&mut conn, &mut store, &mut trainings, CategoryId(99), true)
                .unwrap_err();
        assert!(matches!(
            placeholder.downcast_ref::<CatalogError>(),
            Some(CatalogError::CategoryNotFed(CategoryId(99)))
        ));
    }
}
