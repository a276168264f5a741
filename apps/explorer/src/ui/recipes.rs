use client_core::RecipeListState;
use shared::domain::{Ingredient, Recipe};

pub fn render_recipe_list(state: &RecipeListState) -> String {
    match state {
        RecipeListState::Loading => "[ .. ] Brewing your coffee data...".to_string(),
        RecipeListState::Failed(message) => [
            "!! Error Loading Coffee Data",
            message.as_str(),
            "",
            "Please try again later or check the API endpoint.",
        ]
        .join("\n"),
        RecipeListState::Ready(recipes) => {
            let mut lines = vec![
                "Explore Kopi!".to_string(),
                "Ayo kita cari berbagai cara menyajikan kopi".to_string(),
            ];
            for recipe in recipes {
                lines.push(String::new());
                lines.extend(render_card(recipe));
            }
            lines.join("\n")
        }
    }
}

fn render_card(recipe: &Recipe) -> Vec<String> {
    let mut lines = vec![
        format!("#{} {}", recipe.id.0, recipe.title),
        format!("   {}", recipe.description),
        format!("   image: {}", recipe.image),
        "   Bahan:".to_string(),
    ];
    lines.extend(
        recipe
            .ingredients
            .iter()
            .map(|ingredient| format!("     - {}", ingredient_label(ingredient))),
    );
    lines
}

fn ingredient_label(ingredient: &Ingredient) -> String {
    if ingredient.optional {
        format!("{} (optional)", ingredient.name)
    } else {
        ingredient.name.clone()
    }
}
