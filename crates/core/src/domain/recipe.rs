// Recipe Domain Model
//
// Recipes are resolved outside the core; the scheduler only needs to know
// whether a recipe produces, prepares or cleans up, and which recipe a
// setup/cleanup recipe is attached to.

use serde::{Deserialize, Serialize};

/// Recipe identifier
pub type RecipeId = u32;

/// What a recipe does on the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipeKind {
    Production,
    /// Prepares the line before its target recipe runs
    Setup,
    /// Cleans the line after its target recipe ran
    Cleanup,
}

impl std::fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipeKind::Production => write!(f, "PRODUCTION"),
            RecipeKind::Setup => write!(f, "SETUP"),
            RecipeKind::Cleanup => write!(f, "CLEANUP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub kind: RecipeKind,
    /// Recipe a setup or cleanup recipe belongs to
    pub target_recipe: Option<RecipeId>,
}

impl Recipe {
    pub fn production(id: RecipeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: RecipeKind::Production,
            target_recipe: None,
        }
    }

    pub fn setup(id: RecipeId, name: impl Into<String>, target: RecipeId) -> Self {
        Self {
            id,
            name: name.into(),
            kind: RecipeKind::Setup,
            target_recipe: Some(target),
        }
    }

    pub fn cleanup(id: RecipeId, name: impl Into<String>, target: RecipeId) -> Self {
        Self {
            id,
            name: name.into(),
            kind: RecipeKind::Cleanup,
            target_recipe: Some(target),
        }
    }
}
