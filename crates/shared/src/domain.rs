use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(RecipeId);

/// Marks an ingredient as optional in the recipe source.
pub const OPTIONAL_INGREDIENT_MARKER: char = '*';

/// Shown in place of a recipe image the source left blank.
pub const PLACEHOLDER_IMAGE_URL: &str =
    "https://via.placeholder.com/300x200?text=Coffee+Image+Not+Available";

/// URL of a single remote image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub optional: bool,
}

impl Ingredient {
    /// Parses a raw ingredient line. A line containing the optional marker is
    /// tagged optional and loses its first marker.
    pub fn parse(raw: &str) -> Self {
        if raw.contains(OPTIONAL_INGREDIENT_MARKER) {
            Self {
                name: raw
                    .replacen(OPTIONAL_INGREDIENT_MARKER, "", 1)
                    .trim()
                    .to_string(),
                optional: true,
            }
        } else {
            Self {
                name: raw.trim().to_string(),
                optional: false,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub title: String,
    pub description: String,
    pub image: ImageRef,
    pub ingredients: Vec<Ingredient>,
}
