use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::text::slugify;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(default)]
    pub recipe_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#yield: Option<RecipeYield>,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub sub_recipes: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeYield {
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_unit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeInstructions {
    #[serde(default)]
    pub recipe_id: String,
    #[serde(default)]
    pub steps: Vec<InstructionStep>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionStep {
    pub order: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl Recipe {
    pub fn expected_id(&self) -> String {
        slugify(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdRename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRename {
    pub recipe_id: String,
    pub wanted: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdFixPlan {
    pub renames: Vec<IdRename>,
    pub skipped: Vec<SkippedRename>,
}

/// Works out which recipe keys drifted from the slug of their name.
///
/// `recipes` pairs each row key with the recipe name stored in its document.
/// A rename is skipped when the slug is empty, when another row already holds
/// it, or when an earlier recipe in the list claimed it first.
pub fn plan_id_fixes(recipes: &[(String, String)]) -> IdFixPlan {
    let existing: HashSet<&str> = recipes.iter().map(|(id, _)| id.as_str()).collect();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut plan = IdFixPlan::default();

    for (id, name) in recipes {
        let wanted = slugify(name);
        if &wanted == id {
            continue;
        }

        let reason = if wanted.is_empty() {
            Some("name has no usable characters")
        } else if existing.contains(wanted.as_str()) {
            Some("another recipe already uses this id")
        } else if claimed.contains(&wanted) {
            Some("another recipe is being renamed to this id")
        } else {
            None
        };

        match reason {
            Some(reason) => plan.skipped.push(SkippedRename {
                recipe_id: id.clone(),
                wanted,
                reason: reason.to_string(),
            }),
            None => {
                claimed.insert(wanted.clone());
                plan.renames.push(IdRename { from: id.clone(), to: wanted });
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(rows: &[(&str, &str)]) -> Vec<(String, String)> {
        rows.iter().map(|(id, name)| (id.to_string(), name.to_string())).collect()
    }

    #[test]
    fn drifted_ids_are_renamed_to_slug() {
        let plan = plan_id_fixes(&pairs(&[
            ("butter-chicken", "Butter Chicken"),
            ("recipe-17", "Lamb Rogan Josh"),
            ("Gulab_Jamun", "Gulab Jamun"),
        ]));
        assert_eq!(
            plan.renames,
            vec![
                IdRename { from: "recipe-17".into(), to: "lamb-rogan-josh".into() },
                IdRename { from: "Gulab_Jamun".into(), to: "gulab-jamun".into() },
            ]
        );
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn collisions_are_skipped() {
        let plan = plan_id_fixes(&pairs(&[
            ("butter-chicken", "Butter Chicken"),
            ("old-bc", "Butter Chicken"),
            ("x1", "Chana Masala"),
            ("x2", "Chana  Masala"),
            ("x3", "!!!"),
        ]));
        assert_eq!(plan.renames, vec![IdRename { from: "x1".into(), to: "chana-masala".into() }]);
        let skipped: Vec<_> = plan.skipped.iter().map(|s| s.recipe_id.as_str()).collect();
        assert_eq!(skipped, ["old-bc", "x2", "x3"]);
    }

    #[test]
    fn recipe_keeps_unknown_fields() {
        let recipe: Recipe = serde_json::from_value(json!({
            "recipeId": "dal",
            "name": "Dal",
            "yield": {"quantity": 10, "unit": "kg"},
            "ingredients": [
                {"name": "Lentils", "quantity": 4, "unit": "kg", "costPerUnit": 2.5},
                {"name": "Ghee", "quantity": 0.5, "unit": "kg", "costPerUnit": 12}
            ],
            "allergens": ["dairy"]
        }))
        .unwrap();
        assert_eq!(recipe.expected_id(), "dal");
        assert_eq!(serde_json::to_value(&recipe).unwrap()["allergens"][0], "dairy");
    }
}
