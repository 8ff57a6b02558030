// 🎓 Training Registry - Categories flagged as trainings
//
// The tree builder registers every category whose description carries the
// training marker. The registry is owned by the caller, like the store.

use crate::category::{Category, CategoryId};
use crate::error::Result;
use crate::store::CategoryStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Training {
    pub category_id: CategoryId,
    pub name: String,
}

impl Training {
    pub fn from_category(category: &Category) -> Self {
        Training {
            category_id: category.id(),
            name: category.name().to_string(),
        }
    }
}

/// Registry of all known trainings, in registration order
#[derive(Debug, Default)]
pub struct TrainingRegistry {
    trainings: Vec<Training>,
}

impl TrainingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the training backed by `category`
    ///
    /// Registering the same category again refreshes its name and returns the
    /// existing entry.
    pub fn create_from_category(&mut self, category: &Category) -> &Training {
        match self
            .trainings
            .iter()
            .position(|t| t.category_id == category.id())
        {
            Some(index) => {
                self.trainings[index].name = category.name().to_string();
                &self.trainings[index]
            }
            None => {
                self.trainings.push(Training::from_category(category));
                &self.trainings[self.trainings.len() - 1]
            }
        }
    }

    pub fn find_by_category(&self, category_id: CategoryId) -> Option<&Training> {
        self.trainings.iter().find(|t| t.category_id == category_id)
    }

    /// Drop the training of a category; returns it if it was registered
    pub fn remove(&mut self, category_id: CategoryId) -> Option<Training> {
        let index = self
            .trainings
            .iter()
            .position(|t| t.category_id == category_id)?;
        Some(self.trainings.remove(index))
    }

    pub fn trainings(&self) -> &[Training] {
        &self.trainings
    }

    pub fn len(&self) -> usize {
        self.trainings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trainings.is_empty()
    }

    /// Training that owns a category: the category itself or its nearest
    /// ancestor registered as a training
    pub fn owning_training(
        &self,
        store: &CategoryStore,
        category_id: CategoryId,
    ) -> Result<Option<&Training>> {
        if let Some(training) = self.find_by_category(category_id) {
            return Ok(Some(training));
        }

        for ancestor in store.ancestors(category_id)? {
            if let Some(training) = self.find_by_category(ancestor.id()) {
                return Ok(Some(training));
            }
        }

        Ok(None)
    }
}
