use axum::{extract::State, Json};
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde_json::json;
use shared::*;
use tracing::{info, warn};

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::models::*;
use crate::schema::*;

const RENAME_RECIPE: &str = "\
    UPDATE recipes \
    SET recipe_id = $1, \
        recipe_data = jsonb_set(recipe_data, '{recipeId}', to_jsonb($1::text)), \
        version = version + 1, \
        updated_at = NOW() \
    WHERE recipe_id = $2";

const MOVE_INSTRUCTIONS: &str = "\
    UPDATE recipe_instructions \
    SET recipe_id = $1, \
        instruction_data = jsonb_set(instruction_data, '{recipeId}', to_jsonb($1::text)), \
        updated_at = NOW() \
    WHERE recipe_id = $2";

async fn load_recipe(conn: &mut AsyncPgConnection, recipe_id: &str) -> ApiResult<DbRecipe> {
    recipes::table
        .find(recipe_id)
        .first::<DbRecipe>(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("recipe {} not found", recipe_id)))
}

pub async fn list_recipes(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<Recipe>>> {
    let mut conn = state.pool.get().await?;
    let rows = recipes::table
        .order(recipes::recipe_id.asc())
        .load::<DbRecipe>(&mut conn)
        .await?;

    let recipes = rows.into_iter().map(Recipe::try_from).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(recipes))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(recipe_id): ApiPath<String>,
) -> ApiResult<Json<Recipe>> {
    let mut conn = state.pool.get().await?;
    let row = load_recipe(&mut conn, &recipe_id).await?;
    Ok(Json(Recipe::try_from(row)?))
}

/// PUT /api/recipes/:recipe_id
///
/// Creates or replaces the recipe stored under the path id. The body's own
/// `recipeId` is overwritten so the key and the document never disagree.
pub async fn put_recipe(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(recipe_id): ApiPath<String>,
    ApiJson(mut recipe): ApiJson<Recipe>,
) -> ApiResult<Json<Recipe>> {
    user.require(SCHEDULE_PLANNERS)?;
    if recipe.name.trim().is_empty() {
        return Err(ApiError::BadRequest("recipe name is required".to_string()));
    }
    recipe.recipe_id = recipe_id.clone();

    let new_recipe = NewRecipe {
        recipe_id: recipe_id.clone(),
        recipe_data: serde_json::to_value(&recipe)?,
        version: 1,
    };

    let mut conn = state.pool.get().await?;
    let row = diesel::insert_into(recipes::table)
        .values(&new_recipe)
        .on_conflict(recipes::recipe_id)
        .do_update()
        .set((
            recipes::recipe_data.eq(excluded(recipes::recipe_data)),
            recipes::version.eq(recipes::version + 1),
            recipes::updated_at.eq(Utc::now()),
        ))
        .get_result::<DbRecipe>(&mut conn)
        .await?;

    if recipe.expected_id() != recipe_id {
        warn!("Recipe {} is stored under a key that differs from its name slug", recipe_id);
    }
    info!("Saved recipe {} (version {}) by {}", recipe_id, row.version, user.0.email);
    Ok(Json(Recipe::try_from(row)?))
}

pub async fn delete_recipe(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(recipe_id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(&[Role::Admin])?;

    let mut conn = state.pool.get().await?;
    let id = recipe_id.clone();
    let deleted = conn
        .transaction::<_, ApiError, _>(|conn| {
            Box::pin(async move {
                diesel::delete(recipe_instructions::table.find(id.as_str()))
                    .execute(conn)
                    .await?;
                let deleted = diesel::delete(recipes::table.find(id.as_str())).execute(conn).await?;
                Ok(deleted)
            })
        })
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("recipe {} not found", recipe_id)));
    }

    info!("Deleted recipe {} by {}", recipe_id, user.0.email);
    Ok(Json(json!({ "deleted": true, "recipeId": recipe_id })))
}

pub async fn get_instructions(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(recipe_id): ApiPath<String>,
) -> ApiResult<Json<RecipeInstructions>> {
    let mut conn = state.pool.get().await?;
    let row = recipe_instructions::table
        .find(recipe_id.as_str())
        .first::<DbRecipeInstructions>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("no instructions for recipe {}", recipe_id)))?;

    let mut instructions: RecipeInstructions = serde_json::from_value(row.instruction_data)?;
    instructions.recipe_id = row.recipe_id;
    Ok(Json(instructions))
}

pub async fn put_instructions(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(recipe_id): ApiPath<String>,
    ApiJson(mut instructions): ApiJson<RecipeInstructions>,
) -> ApiResult<Json<RecipeInstructions>> {
    user.require(SCHEDULE_PLANNERS)?;
    instructions.recipe_id = recipe_id.clone();
    instructions.steps.sort_by_key(|step| step.order);

    let mut conn = state.pool.get().await?;
    load_recipe(&mut conn, &recipe_id).await?;

    let row = DbRecipeInstructions {
        recipe_id: recipe_id.clone(),
        instruction_data: serde_json::to_value(&instructions)?,
        updated_at: Some(Utc::now()),
    };
    diesel::insert_into(recipe_instructions::table)
        .values(&row)
        .on_conflict(recipe_instructions::recipe_id)
        .do_update()
        .set((
            recipe_instructions::instruction_data
                .eq(excluded(recipe_instructions::instruction_data)),
            recipe_instructions::updated_at.eq(excluded(recipe_instructions::updated_at)),
        ))
        .execute(&mut conn)
        .await?;

    info!(
        "Saved {} instruction steps for recipe {}",
        instructions.steps.len(),
        recipe_id
    );
    Ok(Json(instructions))
}

/// POST /api/recipes/fix-ids
///
/// Re-keys every recipe whose id drifted from the slug of its name. Renames
/// that would collide are reported in `skipped` and left alone. The recipe rows
/// stay locked from planning to rename, and the rename rewrites only the key
/// fields so concurrent edits to the rest of a document are kept.
pub async fn fix_recipe_ids(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<IdFixPlan>> {
    user.require(&[Role::Admin])?;

    let mut conn = state.pool.get().await?;
    let plan = conn
        .transaction::<_, ApiError, _>(|conn| {
            Box::pin(async move {
                let rows = recipes::table
                    .order(recipes::recipe_id.asc())
                    .for_update()
                    .load::<DbRecipe>(conn)
                    .await?;

                let mut keys = Vec::with_capacity(rows.len());
                for row in rows {
                    let recipe_id = row.recipe_id.clone();
                    let recipe = Recipe::try_from(row)?;
                    keys.push((recipe_id, recipe.name));
                }

                let plan = plan_id_fixes(&keys);
                for rename in &plan.renames {
                    diesel::sql_query(RENAME_RECIPE)
                        .bind::<Text, _>(rename.to.as_str())
                        .bind::<Text, _>(rename.from.as_str())
                        .execute(conn)
                        .await?;
                    diesel::sql_query(MOVE_INSTRUCTIONS)
                        .bind::<Text, _>(rename.to.as_str())
                        .bind::<Text, _>(rename.from.as_str())
                        .execute(conn)
                        .await?;
                }
                Ok(plan)
            })
        })
        .await?;

    for skipped in &plan.skipped {
        warn!(
            "Left recipe {} as is, wanted {}: {}",
            skipped.recipe_id, skipped.wanted, skipped.reason
        );
    }
    info!(
        "Renamed {} recipe ids by {} ({} skipped)",
        plan.renames.len(),
        user.0.email,
        plan.skipped.len()
    );
    Ok(Json(plan))
}
