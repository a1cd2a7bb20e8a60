use std::collections::BTreeMap;

use axum::{extract::State, Json};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use shared::*;
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::*;
use crate::schema::*;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortageQuery {
    pub schedule_id: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortageList {
    pub shortages: Vec<ShortageView>,
    pub total: usize,
    pub by_priority: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub resolution_status: Option<ShortageResolution>,
    pub resolution_action: Option<String>,
    pub resolution_notes: Option<String>,
}

/// GET /api/inventory-shortages?scheduleId=&priority=&status=
pub async fn list_shortages(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiQuery(query): ApiQuery<ShortageQuery>,
) -> ApiResult<Json<ShortageList>> {
    let priority = query
        .priority
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(str::parse::<ShortagePriority>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let mut statement = ingredient_shortages::table.into_boxed();
    if let Some(schedule_id) = query.schedule_id.filter(|s| !s.is_empty()) {
        statement = statement.filter(ingredient_shortages::schedule_id.eq(schedule_id));
    }
    if let Some(priority) = priority {
        statement = statement.filter(ingredient_shortages::priority.eq(priority.as_str()));
    }
    statement = match StatusFilter::parse(query.status.as_deref()) {
        StatusFilter::PendingOrUnset => {
            let pending = ShortageResolution::Pending.as_str();
            statement.filter(
                ingredient_shortages::resolution_status
                    .is_null()
                    .or(ingredient_shortages::resolution_status.eq(pending)),
            )
        }
        StatusFilter::All => statement,
        StatusFilter::Exactly(status) => {
            statement.filter(ingredient_shortages::resolution_status.eq(status))
        }
    };

    let mut conn = state.pool.get().await?;
    let mut rows = statement
        .order(ingredient_shortages::created_at.desc())
        .load::<IngredientShortage>(&mut conn)
        .await?;
    rows.sort_by_key(|row| ShortagePriority::rank(&row.priority));

    let mut by_priority = BTreeMap::new();
    for row in &rows {
        *by_priority.entry(row.priority.clone()).or_insert(0) += 1;
    }

    let shortages: Vec<ShortageView> = rows.into_iter().map(ShortageView::from).collect();
    Ok(Json(ShortageList {
        total: shortages.len(),
        shortages,
        by_priority,
    }))
}

/// PATCH /api/inventory-shortages/:shortage_id/resolve
pub async fn resolve_shortage(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(shortage_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ResolveRequest>,
) -> ApiResult<Json<ShortageView>> {
    user.require(SCHEDULE_PLANNERS)?;

    let resolution = request.resolution_status.unwrap_or_default();
    let changes = ShortageResolutionChanges {
        resolution_status: Some(resolution.as_str().to_string()),
        resolution_action: request.resolution_action,
        resolution_notes: request.resolution_notes,
        resolved_by: Some(user.0.email.clone()),
        resolved_at: Some(Utc::now()),
    };

    let mut conn = state.pool.get().await?;
    let row = diesel::update(ingredient_shortages::table.find(shortage_id))
        .set(&changes)
        .get_result::<IngredientShortage>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("shortage {} not found", shortage_id)))?;

    info!(
        "Shortage {} ({}) marked {} by {}",
        shortage_id, row.ingredient_name, resolution, user.0.email
    );
    Ok(Json(ShortageView::from(row)))
}
