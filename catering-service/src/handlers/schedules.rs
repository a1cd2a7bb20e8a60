use axum::{extract::State, Json};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use serde_json::json;
use shared::*;
use tracing::{info, warn};

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{DbPool, MAX_WRITE_ATTEMPTS};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::models::*;
use crate::schema::*;

/// Identifies one item inside one day of one schedule.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub schedule_id: String,
    pub date: String,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    #[serde(flatten)]
    pub item: ItemRef,
    pub station: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(flatten)]
    pub item: ItemRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(flatten)]
    pub item: ItemRef,
    #[serde(default = "default_true")]
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustQuantityRequest {
    #[serde(flatten)]
    pub item: ItemRef,
    pub quantity: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    #[serde(flatten)]
    pub item: ItemRef,
    pub new_date: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRecipeProgressRequest {
    #[serde(flatten)]
    pub item: ItemRef,
    pub sub_recipe: String,
    pub completed: bool,
}

fn default_true() -> bool {
    true
}

async fn load_schedule(
    conn: &mut AsyncPgConnection,
    schedule_id: &str,
) -> ApiResult<DbProductionSchedule> {
    production_schedules::table
        .find(schedule_id)
        .first::<DbProductionSchedule>(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("schedule {} not found", schedule_id)))
}

/// Runs `change` against the current schedule document and stores the result
/// only if the row still has the version that was read. A lost race re-reads
/// and re-applies, so concurrent edits to different items both land.
pub async fn mutate_schedule<T, F>(pool: &DbPool, schedule_id: &str, mut change: F) -> ApiResult<T>
where
    F: FnMut(&mut ProductionSchedule) -> ApiResult<T>,
{
    let mut conn = pool.get().await?;

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let row = load_schedule(&mut conn, schedule_id).await?;
        let read_version = row.version;
        let mut schedule = ProductionSchedule::try_from(row)?;

        let outcome = change(&mut schedule)?;
        let data = serde_json::to_value(&schedule)?;

        let updated = diesel::update(
            production_schedules::table
                .filter(production_schedules::schedule_id.eq(schedule_id))
                .filter(production_schedules::version.eq(read_version)),
        )
        .set((
            production_schedules::schedule_data.eq(data),
            production_schedules::version.eq(read_version + 1),
            production_schedules::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 1 {
            return Ok(outcome);
        }
        warn!("Schedule {} changed underneath update (attempt {}), retrying", schedule_id, attempt);
    }

    Err(ApiError::Conflict(format!(
        "schedule {} is being edited concurrently, try again",
        schedule_id
    )))
}

fn required(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

pub async fn list_schedules(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<ScheduleSummary>>> {
    let mut conn = state.pool.get().await?;
    let rows = production_schedules::table
        .order(production_schedules::week_start.desc())
        .load::<DbProductionSchedule>(&mut conn)
        .await?;

    let summaries = rows
        .into_iter()
        .map(|row| ProductionSchedule::try_from(row).map(|s| s.summary()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(summaries))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(schedule_id): ApiPath<String>,
) -> ApiResult<Json<ProductionSchedule>> {
    let mut conn = state.pool.get().await?;
    let row = load_schedule(&mut conn, &schedule_id).await?;
    Ok(Json(ProductionSchedule::try_from(row)?))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(schedule): ApiJson<ProductionSchedule>,
) -> ApiResult<Json<ScheduleSummary>> {
    user.require(SCHEDULE_PLANNERS)?;
    required(&schedule.schedule_id, "scheduleId")?;
    if schedule.week_start > schedule.week_end {
        return Err(ApiError::BadRequest("weekStart must not be after weekEnd".to_string()));
    }
    schedule.validate()?;

    let new_schedule = NewProductionSchedule {
        schedule_id: schedule.schedule_id.clone(),
        week_start: schedule.week_start,
        week_end: schedule.week_end,
        schedule_data: serde_json::to_value(&schedule)?,
        version: 1,
    };

    let mut conn = state.pool.get().await?;
    match diesel::insert_into(production_schedules::table)
        .values(&new_schedule)
        .execute(&mut conn)
        .await
    {
        Ok(_) => {}
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(ApiError::Conflict(format!(
                "schedule {} already exists",
                schedule.schedule_id
            )));
        }
        Err(e) => return Err(e.into()),
    }

    info!("Created production schedule {} by {}", schedule.schedule_id, user.0.email);
    Ok(Json(schedule.summary()))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(schedule_id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(OPERATIONS)?;
    let mut conn = state.pool.get().await?;
    let deleted = diesel::delete(production_schedules::table.find(schedule_id.as_str()))
        .execute(&mut conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("schedule {} not found", schedule_id)));
    }

    info!("Deleted production schedule {} by {}", schedule_id, user.0.email);
    Ok(Json(json!({ "deleted": true, "scheduleId": schedule_id })))
}

pub async fn assign_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<AssignRequest>,
) -> ApiResult<Json<ProductionItem>> {
    user.require(SCHEDULE_PLANNERS)?;
    let station = required(&request.station, "station")?;
    let by = user.0.email.clone();
    let target = &request.item;

    let item = mutate_schedule(&state.pool, &target.schedule_id, |schedule| {
        let item = schedule.item_mut(&target.date, &target.item_id)?;
        item.assign(&station, &by, Utc::now());
        Ok(item.clone())
    })
    .await?;

    info!("Assigned {} on {} to {}", target.item_id, target.date, station);
    Ok(Json(item))
}

pub async fn reassign_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<AssignRequest>,
) -> ApiResult<Json<ProductionItem>> {
    user.require(SCHEDULE_PLANNERS)?;
    let station = required(&request.station, "station")?;
    let by = user.0.email.clone();
    let target = &request.item;

    let item = mutate_schedule(&state.pool, &target.schedule_id, |schedule| {
        let item = schedule.item_mut(&target.date, &target.item_id)?;
        item.reassign(&station, &by, request.reason.clone(), Utc::now());
        Ok(item.clone())
    })
    .await?;

    info!(
        "Reassigned {} on {} from {:?} to {}",
        target.item_id, target.date, item.reassigned_from, station
    );
    Ok(Json(item))
}

pub async fn start_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<StartRequest>,
) -> ApiResult<Json<ProductionItem>> {
    user.require(SCHEDULE_WORKERS)?;
    let target = &request.item;

    let item = mutate_schedule(&state.pool, &target.schedule_id, |schedule| {
        let item = schedule.item_mut(&target.date, &target.item_id)?;
        if !user.0.can_work_on(item.assigned_to.as_deref()) {
            return Err(ApiError::forbidden());
        }
        item.start(Utc::now());
        Ok(item.clone())
    })
    .await?;

    info!("Started {} on {}", target.item_id, target.date);
    Ok(Json(item))
}

pub async fn complete_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CompleteRequest>,
) -> ApiResult<Json<ProductionItem>> {
    user.require(SCHEDULE_WORKERS)?;
    let target = &request.item;

    let item = mutate_schedule(&state.pool, &target.schedule_id, |schedule| {
        let item = schedule.item_mut(&target.date, &target.item_id)?;
        if !user.0.can_work_on(item.assigned_to.as_deref()) {
            return Err(ApiError::forbidden());
        }
        item.set_completed(request.completed, &user.0.email, Utc::now());
        Ok(item.clone())
    })
    .await?;

    info!("Marked {} on {} completed={}", target.item_id, target.date, request.completed);
    Ok(Json(item))
}

pub async fn adjust_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<AdjustQuantityRequest>,
) -> ApiResult<Json<ProductionItem>> {
    user.require(SCHEDULE_PLANNERS)?;
    let target = &request.item;

    let item = mutate_schedule(&state.pool, &target.schedule_id, |schedule| {
        let item = schedule.item_mut(&target.date, &target.item_id)?;
        item.adjust_quantity(request.quantity, request.reason.clone(), Utc::now())?;
        Ok(item.clone())
    })
    .await?;

    info!("Adjusted {} on {} to {} {}", target.item_id, target.date, item.quantity, item.unit);
    Ok(Json(item))
}

pub async fn reschedule_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<RescheduleRequest>,
) -> ApiResult<Json<ProductionItem>> {
    user.require(SCHEDULE_PLANNERS)?;
    let new_date = required(&request.new_date, "newDate")?;
    let target = &request.item;

    let item = mutate_schedule(&state.pool, &target.schedule_id, |schedule| {
        let moved = schedule.reschedule(
            &target.date,
            &target.item_id,
            &new_date,
            request.reason.clone(),
            Utc::now(),
        )?;
        Ok(moved.clone())
    })
    .await?;

    info!("Rescheduled {} from {} to {}", target.item_id, target.date, new_date);
    Ok(Json(item))
}

pub async fn update_sub_recipe_progress(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<SubRecipeProgressRequest>,
) -> ApiResult<Json<ProductionItem>> {
    user.require(SCHEDULE_WORKERS)?;
    let sub_recipe = required(&request.sub_recipe, "subRecipe")?;
    let target = &request.item;

    let item = mutate_schedule(&state.pool, &target.schedule_id, |schedule| {
        let item = schedule.item_mut(&target.date, &target.item_id)?;
        if !user.0.can_work_on(item.assigned_to.as_deref()) {
            return Err(ApiError::forbidden());
        }
        item.set_sub_recipe_progress(&sub_recipe, request.completed, &user.0.email, Utc::now());
        Ok(item.clone())
    })
    .await?;

    info!(
        "Sub-recipe {} of {} on {} completed={}",
        sub_recipe, target.item_id, target.date, request.completed
    );
    Ok(Json(item))
}
