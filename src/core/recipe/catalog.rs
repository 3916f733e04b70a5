use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::core::recipe::{Recipe, RecipeError};

/// Immutable view of the catalog at one point in time, ordered by name.
pub type CatalogSnapshot = Arc<BTreeMap<String, Arc<Recipe>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    recipes: Vec<Recipe>,
}

/// Read-mostly recipe store. Writers publish a fresh map so readers holding a
/// snapshot are never affected by concurrent adds.
#[derive(Default)]
pub struct RecipeCatalog {
    recipes: RwLock<CatalogSnapshot>,
}

impl RecipeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        Arc::clone(&*self.recipes.read().await)
    }

    pub async fn add(&self, recipe: Recipe) -> Result<AddOutcome, RecipeError> {
        recipe.validate()?;
        let mut guard = self.recipes.write().await;
        let outcome = match guard.get(&recipe.name) {
            Some(existing) if **existing == recipe => {
                return Err(RecipeError::Duplicate(recipe.name));
            }
            Some(_) => AddOutcome::Replaced,
            None => AddOutcome::Inserted,
        };
        let mut next = (**guard).clone();
        info!("Registering recipe: {} ({:?})", recipe.name, outcome);
        next.insert(recipe.name.clone(), Arc::new(recipe));
        *guard = Arc::new(next);
        Ok(outcome)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Recipe>> {
        self.recipes.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<Recipe>> {
        self.snapshot().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.recipes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert every recipe, skipping invalid or duplicate entries. Returns
    /// how many were accepted.
    pub async fn extend(&self, recipes: Vec<Recipe>) -> usize {
        let mut accepted = 0;
        for recipe in recipes {
            let name = recipe.name.clone();
            match self.add(recipe).await {
                Ok(_) => accepted += 1,
                Err(e) => warn!("Skipping recipe {:?}: {}", name, e),
            }
        }
        accepted
    }

    /// Parse a YAML catalog of the form `recipes: [...]`.
    pub fn parse_yaml(content: &str) -> Result<Vec<Recipe>> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        Ok(file.recipes)
    }

    pub async fn load_yaml<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let recipes = Self::parse_yaml(&content)?;
        let total = recipes.len();
        let accepted = self.extend(recipes).await;
        info!(
            "Loaded {} of {} recipes from {:?}",
            accepted, total, path
        );
        Ok(accepted)
    }
}
