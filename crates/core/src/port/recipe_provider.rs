// Recipe Provider Port (recipe resolution lives outside the core)

use crate::domain::{Recipe, RecipeId};
use std::sync::Arc;

pub trait RecipeProvider: Send + Sync {
    /// Resolve a recipe by id
    fn recipe(&self, id: RecipeId) -> Option<Arc<Recipe>>;
}
