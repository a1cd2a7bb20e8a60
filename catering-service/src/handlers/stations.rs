use axum::{extract::State, Json};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use shared::*;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiPath, ApiQuery};
use crate::models::*;
use crate::schema::*;

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationTasksResponse {
    pub station: String,
    pub date: NaiveDate,
    pub tasks: Vec<StationTask>,
}

/// GET /api/stations/:station/tasks?date=YYYY-MM-DD
pub async fn station_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(station): ApiPath<String>,
    ApiQuery(query): ApiQuery<TasksQuery>,
) -> ApiResult<Json<StationTasksResponse>> {
    if user.0.role == Role::StationStaff && !user.0.can_work_on(Some(&station)) {
        return Err(ApiError::Forbidden(
            "station staff can only view their own station".to_string(),
        ));
    }

    let mut conn = state.pool.get().await?;
    let rows = production_schedules::table
        .filter(production_schedules::week_start.le(query.date))
        .filter(production_schedules::week_end.ge(query.date))
        .order(production_schedules::week_start.asc())
        .load::<DbProductionSchedule>(&mut conn)
        .await?;

    let day = query.date.format("%Y-%m-%d").to_string();
    let mut tasks = Vec::new();
    for row in rows {
        let schedule = ProductionSchedule::try_from(row)?;
        tasks.extend(schedule.station_tasks(&day, &station));
    }

    Ok(Json(StationTasksResponse {
        station,
        date: query.date,
        tasks,
    }))
}
