// 🗂️ Category Store - Identity map for course categories
//
// "One id, one category"
//
// Every category seen during a run lives here exactly once. Rows refer to
// each other by id (a row's own id, or a parent id), so the store hands out
// the existing instance or creates a bare one on demand. Parents are plain
// ids resolved through the store, which keeps the tree free of pointers.

use crate::category::{Category, CategoryId};
use crate::error::{CatalogError, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// Separator used by `CategoryStore::hierarchy`
pub const HIERARCHY_SEPARATOR: &str = " / ";

/// Handle to a category registered in a `CategoryStore`
///
/// Two handles are equal exactly when they designate the same instance.
/// A handle is only meaningful for the store that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CategoryRef(usize);

// ============================================================================
// CATEGORY STORE
// ============================================================================

/// Caller-owned registry of categories, keyed by id
///
/// Single-threaded; callers sharing a store across threads wrap it in their
/// own lock so that `retrieve_or_create` stays serialized per id.
#[derive(Debug, Default)]
pub struct CategoryStore {
    /// Arena, in registration order
    categories: Vec<Category>,
    index: HashMap<CategoryId, CategoryRef>,
}

impl CategoryStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing category for `id`, or a freshly registered bare one
    pub fn retrieve_or_create(&mut self, id: CategoryId) -> CategoryRef {
        if let Some(existing) = self.index.get(&id) {
            return *existing;
        }

        let handle = CategoryRef(self.categories.len());
        self.categories.push(Category::new(id));
        self.index.insert(id, handle);
        handle
    }

    /// Find a category, creating it only when `force_create` is set
    ///
    /// An unknown id without `force_create` is `None`, never an implicit
    /// creation.
    pub fn retrieve(&mut self, id: CategoryId, force_create: bool) -> Option<CategoryRef> {
        if force_create {
            Some(self.retrieve_or_create(id))
        } else {
            self.index.get(&id).copied()
        }
    }

    /// Read-only lookup, no side effects
    pub fn lookup(&self, id: CategoryId) -> Option<&Category> {
        self.index.get(&id).map(|handle| &self.categories[handle.0])
    }

    pub fn lookup_mut(&mut self, id: CategoryId) -> Option<&mut Category> {
        match self.index.get(&id) {
            Some(handle) => Some(&mut self.categories[handle.0]),
            None => None,
        }
    }

    /// Resolve a handle produced by this store
    pub fn get(&self, handle: CategoryRef) -> &Category {
        &self.categories[handle.0]
    }

    pub fn get_mut(&mut self, handle: CategoryRef) -> &mut Category {
        &mut self.categories[handle.0]
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.index.contains_key(&id)
    }

    /// All categories, in registration order
    pub fn all(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    // ========================================================================
    // HIERARCHY
    // ========================================================================

    /// Get parent of a category
    pub fn parent_of(&self, category: &Category) -> Option<&Category> {
        category.parent().and_then(|parent_id| self.lookup(parent_id))
    }

    /// Direct children of a category, in registration order
    pub fn children_of(&self, id: CategoryId) -> Vec<&Category> {
        self.categories
            .iter()
            .filter(|category| category.parent() == Some(id))
            .collect()
    }

    /// Categories without a parent (placeholders included)
    pub fn roots(&self) -> Vec<&Category> {
        self.categories.iter().filter(|category| category.is_root()).collect()
    }

    /// Ancestors of a category, nearest parent first
    ///
    /// Fails on an unknown id (the category itself or a dangling parent) and on
    /// a parent chain that loops back on itself.
    pub fn ancestors(&self, id: CategoryId) -> Result<Vec<&Category>> {
        let mut current = self.lookup(id).ok_or(CatalogError::CategoryNotFound(id))?;
        let mut seen = HashSet::from([id]);
        let mut ancestors = Vec::new();

        while let Some(parent_id) = current.parent() {
            if !seen.insert(parent_id) {
                return Err(CatalogError::HierarchyCycle(id));
            }
            let parent = self
                .lookup(parent_id)
                .ok_or(CatalogError::CategoryNotFound(parent_id))?;
            ancestors.push(parent);
            current = parent;
        }

        Ok(ancestors)
    }

    /// Names from the root down to the category itself
    ///
    /// Example: ["Math", "Algebra", "Quadratics"]
    pub fn path(&self, id: CategoryId) -> Result<Vec<String>> {
        let category = self.lookup(id).ok_or(CatalogError::CategoryNotFound(id))?;
        let mut path: Vec<String> = self
            .ancestors(id)?
            .into_iter()
            .rev()
            .map(|ancestor| ancestor.name().to_string())
            .collect();
        path.push(category.name().to_string());
        Ok(path)
    }

    /// Parent hierarchy formatted "[root] / ... / [parent] / [category]"
    ///
    /// A never-fed placeholder ancestor contributes an empty name.
    pub fn hierarchy(&self, id: CategoryId) -> Result<String> {
        Ok(self.path(id)?.join(HIERARCHY_SEPARATOR))
    }

    /// Number of ancestors (0 for a root)
    pub fn depth(&self, id: CategoryId) -> Result<usize> {
        Ok(self.ancestors(id)?.len())
    }

    /// Check if `ancestor_id` is `descendant_id` or one of its ancestors
    pub fn is_ancestor(&self, ancestor_id: CategoryId, descendant_id: CategoryId) -> Result<bool> {
        if ancestor_id == descendant_id {
            return Ok(self.contains(descendant_id));
        }
        Ok(self
            .ancestors(descendant_id)?
            .iter()
            .any(|ancestor| ancestor.id() == ancestor_id))
    }

    /// All descendants of a category, breadth first
    pub fn descendants(&self, id: CategoryId) -> Vec<&Category> {
        let mut descendants = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if visited.insert(child.id()) {
                    descendants.push(child);
                    queue.push_back(child.id());
                }
            }
        }

        descendants
    }
}

// ============================================================================
// TESTS
// ============================================================================
