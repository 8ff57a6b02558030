// 🏷️ Category Entity - Host course categories seen as a training hierarchy
//
// "The description is the storage, the training flag is a view of it"
//
// Problem solved:
// - The host platform owns the course_categories table and we may only
//   rewrite the description column
// - A category is a training when its description carries an empty marker
//   span: <span class="attestoodle_training"></span>
// - Categories are created bare when first referenced (possibly as somebody's
//   parent) and fed later, when their own row is read

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ============================================================================
// TRAINING MARKER
// ============================================================================

/// Canonical marker appended to a description to flag a training
pub const TRAINING_MARKER: &str = r#"<span class="attestoodle_training"></span>"#;

/// Matches the marker in either quote style, any case
fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r#"(?i)<span class=(?:"attestoodle_training"|'attestoodle_training')></span>"#)
            .expect("training marker pattern is a valid regex")
    })
}

/// Decode the training flag from a description
///
/// Anything that does not contain the marker (including malformed markers)
/// is simply not a training.
pub fn extract_training(description: &str) -> bool {
    marker_regex().is_match(description)
}

/// Encode the training flag into a description
///
/// - `true` with a marker present: every marker is rewritten to the canonical
///   double-quoted form, in place
/// - `true` without a marker: the canonical marker is appended
/// - `false`: every marker is stripped, surrounding text is kept
pub fn encode_training(description: &str, is_training: bool) -> String {
    let regex = marker_regex();

    if !is_training {
        return regex.replace_all(description, "").into_owned();
    }

    if regex.is_match(description) {
        regex
            .replace_all(description, NoExpand(TRAINING_MARKER))
            .into_owned()
    } else {
        format!("{}{}", description, TRAINING_MARKER)
    }
}

// ============================================================================
// CATEGORY ID
// ============================================================================

/// Host primary key of a course category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl CategoryId {
    /// Interpret a raw `parent` column: 0 (or anything non positive) means root
    pub fn parent_from_raw(raw: i64) -> Option<CategoryId> {
        if raw > 0 {
            Some(CategoryId(raw))
        } else {
            None
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CategoryId {
    fn from(raw: i64) -> Self {
        CategoryId(raw)
    }
}

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

/// A course category of the host platform
///
/// Identity: `id` (assigned once, at creation)
/// Values: name, description, parent (set by `feed`)
/// Hierarchy: `parent` is an id resolved through the owning `CategoryStore`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    id: CategoryId,
    name: String,
    description: String,
    parent: Option<CategoryId>,
    /// False until the category's own row has been processed
    fed: bool,
}

impl Category {
    /// Bare category, known only by its id
    pub fn new(id: CategoryId) -> Self {
        Category {
            id,
            name: String::new(),
            description: String::new(),
            parent: None,
            fed: false,
        }
    }

    /// Populate a bare category from its row
    ///
    /// The training flag is carried by `description`.
    pub fn feed(&mut self, name: String, description: String, parent: Option<CategoryId>) {
        self.name = name;
        self.description = description;
        self.parent = parent;
        self.fed = true;
    }

    pub fn id(&self) -> CategoryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parent(&self) -> Option<CategoryId> {
        self.parent
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Check if this is a root category (no parent)
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_fed(&self) -> bool {
        self.fed
    }

    pub fn is_training(&self) -> bool {
        extract_training(&self.description)
    }

    /// Set the training flag, rewriting the description if it changes
    ///
    /// Returns `true` when the description was rewritten, `false` when the
    /// category already had that flag (nothing to persist).
    pub fn set_training(&mut self, is_training: bool) -> bool {
        if self.is_training() == is_training {
            return false;
        }
        self.description = encode_training(&self.description, is_training);
        true
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn set_description(&mut self, description: String) {
        self.description = description;
    }
}

// ============================================================================
// TESTS
// ============================================================================
