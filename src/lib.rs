// Training Catalog - Core Library
// Course categories of the host platform, read as a tree, with a training
// flag stored inside each category description.

pub mod error;
pub mod config;
pub mod category;       // Category entity + training marker codec
pub mod store;          // Identity map of categories
pub mod training;       // Training registry
pub mod db;             // Data access (course_categories + plugin tables)
pub mod schema;         // Idempotent schema upgrade
pub mod builder;        // Two-phase category tree builder

// Re-export commonly used types
pub use error::{CatalogError, Result};
pub use config::{Config, load_config, init_logging, get_database_path};
pub use category::{
    Category, CategoryId, TRAINING_MARKER,
    extract_training, encode_training,
};
pub use store::{CategoryRef, CategoryStore, HIERARCHY_SEPARATOR};
pub use training::{Training, TrainingRegistry};
pub use db::{
    CategoryRow, TrainingRecord, Milestone,
    setup_database, load_csv, insert_categories,
    get_all_categories, get_categories_by_id, get_categories_paths,
    update_category_description,
    get_all_trainings, insert_training, delete_training,
    get_all_milestones, insert_milestone, update_milestone, delete_milestone,
};
pub use schema::{
    SchemaStep, UPGRADE_STEPS, upgrade_schema,
    table_exists, column_exists, unique_index_exists,
};
pub use builder::{
    BuildReport, Catalog, CategoryTreeBuilder, CategoryView,
    load_catalog, set_training_flag,
};
