// In-Memory RecipeProvider

use lineflow_core::domain::{Recipe, RecipeId, RecipeKind};
use lineflow_core::port::RecipeProvider;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct InMemoryRecipeCatalog {
    recipes: RwLock<HashMap<RecipeId, Arc<Recipe>>>,
}

impl InMemoryRecipeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipes(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        let catalog = Self::new();
        for recipe in recipes {
            catalog.register(recipe);
        }
        catalog
    }

    /// Register or replace a recipe
    pub fn register(&self, recipe: Recipe) -> Arc<Recipe> {
        let recipe = Arc::new(recipe);
        self.recipes.write().insert(recipe.id, Arc::clone(&recipe));
        recipe
    }

    /// Setup recipe preparing the line for `target`, if any
    pub fn setup_for(&self, target: RecipeId) -> Option<Arc<Recipe>> {
        self.recipes
            .read()
            .values()
            .find(|recipe| recipe.kind == RecipeKind::Setup && recipe.target_recipe == Some(target))
            .cloned()
    }
}

impl RecipeProvider for InMemoryRecipeCatalog {
    fn recipe(&self, id: RecipeId) -> Option<Arc<Recipe>> {
        self.recipes.read().get(&id).cloned()
    }
}
