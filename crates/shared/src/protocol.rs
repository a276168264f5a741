use serde::{Deserialize, Serialize};

use crate::domain::{ImageRef, Ingredient, Recipe, RecipeId, PLACEHOLDER_IMAGE_URL};

/// Body of the random image endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomImagePayload {
    pub file: String,
}

/// One element of the recipe endpoint's array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipePayload {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

impl From<RecipePayload> for Recipe {
    fn from(value: RecipePayload) -> Self {
        let image = value
            .image
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_string());

        Self {
            id: RecipeId(value.id),
            title: value.title,
            description: value.description,
            image: ImageRef::new(image),
            ingredients: value
                .ingredients
                .iter()
                .map(|raw| Ingredient::parse(raw))
                .collect(),
        }
    }
}
