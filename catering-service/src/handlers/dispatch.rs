use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use serde_json::json;
use shared::*;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::{DbPool, MAX_WRITE_ATTEMPTS};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::*;
use crate::schema::*;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDispatchRequest {
    pub dispatch_date: NaiveDate,
    pub branch_dispatches: Vec<BranchDispatch>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    pub parent_dispatch_id: Uuid,
    pub dispatch_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<FlaggedItem>,
}

/// Hides the branches a branch-level user has no business seeing.
fn visible_to(user: &AuthUser, mut dispatch: Dispatch) -> Option<Dispatch> {
    if user.0.sees_all_branches() {
        return Some(dispatch);
    }
    dispatch
        .branch_dispatches
        .retain(|b| user.0.can_access_branch(&b.branch_slug));
    (!dispatch.branch_dispatches.is_empty()).then_some(dispatch)
}

async fn load_dispatch(conn: &mut AsyncPgConnection, dispatch_id: Uuid) -> ApiResult<DbDispatch> {
    dispatches::table
        .find(dispatch_id)
        .first::<DbDispatch>(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("dispatch {} not found", dispatch_id)))
}

/// Read-modify-write of a dispatch guarded by its version column. Returns the
/// closure's outcome together with the dispatch as stored.
pub async fn mutate_dispatch<T, F>(
    pool: &DbPool,
    dispatch_id: Uuid,
    mut change: F,
) -> ApiResult<(T, Dispatch)>
where
    F: FnMut(&mut Dispatch) -> ApiResult<T>,
{
    let mut conn = pool.get().await?;

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut dispatch = Dispatch::try_from(load_dispatch(&mut conn, dispatch_id).await?)?;
        let read_version = dispatch.version;

        let outcome = change(&mut dispatch)?;
        let now = Utc::now();

        let updated = diesel::update(
            dispatches::table
                .filter(dispatches::id.eq(dispatch_id))
                .filter(dispatches::version.eq(read_version)),
        )
        .set((
            dispatches::branch_dispatches.eq(serde_json::to_value(&dispatch.branch_dispatches)?),
            dispatches::follow_up_dispatch_ids.eq(dispatch.follow_up_dispatch_ids.clone()),
            dispatches::notes.eq(dispatch.notes.clone()),
            dispatches::version.eq(read_version + 1),
            dispatches::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 1 {
            dispatch.version = read_version + 1;
            dispatch.updated_at = Some(now);
            return Ok((outcome, dispatch));
        }
        warn!("Dispatch {} changed underneath update (attempt {}), retrying", dispatch_id, attempt);
    }

    Err(ApiError::Conflict(format!(
        "dispatch {} is being edited concurrently, try again",
        dispatch_id
    )))
}

pub async fn list_dispatches(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Vec<Dispatch>>> {
    let mut conn = state.pool.get().await?;
    let mut statement = dispatches::table
        .order((dispatches::dispatch_date.desc(), dispatches::created_at.desc()))
        .into_boxed();
    if let Some(date) = query.date {
        statement = statement.filter(dispatches::dispatch_date.eq(date));
    }
    let rows = statement.load::<DbDispatch>(&mut conn).await?;

    let mut visible = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(dispatch) = visible_to(&user, Dispatch::try_from(row)?) {
            visible.push(dispatch);
        }
    }
    Ok(Json(visible))
}

pub async fn get_dispatch(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(dispatch_id): ApiPath<Uuid>,
) -> ApiResult<Json<Dispatch>> {
    let mut conn = state.pool.get().await?;
    let dispatch = Dispatch::try_from(load_dispatch(&mut conn, dispatch_id).await?)?;
    visible_to(&user, dispatch)
        .map(Json)
        .ok_or_else(ApiError::forbidden)
}

pub async fn create_dispatch(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CreateDispatchRequest>,
) -> ApiResult<Json<Dispatch>> {
    user.require(SCHEDULE_PLANNERS)?;
    if request.branch_dispatches.is_empty() {
        return Err(ApiError::BadRequest("a dispatch needs at least one branch".to_string()));
    }

    let mut branches = request.branch_dispatches;
    for (i, branch) in branches.iter().enumerate() {
        if branches[..i].iter().any(|b| b.branch_slug == branch.branch_slug) {
            return Err(ApiError::BadRequest(format!(
                "branch {} appears twice",
                branch.branch_slug
            )));
        }
    }
    branches.iter_mut().for_each(BranchDispatch::fill_missing_ids);

    let new_dispatch = NewDispatch {
        id: Uuid::new_v4(),
        dispatch_date: request.dispatch_date,
        created_by: user.0.email.clone(),
        branch_dispatches: serde_json::to_value(&branches)?,
        parent_dispatch_id: None,
        follow_up_dispatch_ids: Vec::new(),
        notes: request.notes,
        version: 1,
    };

    let mut conn = state.pool.get().await?;
    let row = diesel::insert_into(dispatches::table)
        .values(&new_dispatch)
        .get_result::<DbDispatch>(&mut conn)
        .await?;

    info!(
        "Created dispatch {} for {} with {} branches",
        row.id,
        row.dispatch_date,
        branches.len()
    );
    Ok(Json(Dispatch::try_from(row)?))
}

pub async fn update_dispatch(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(dispatch_id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<BranchUpdate>,
) -> ApiResult<Json<Dispatch>> {
    let ((completed_branch, parent_id), dispatch) =
        mutate_dispatch(&state.pool, dispatch_id, |dispatch| {
            if !user.0.can_access_branch(&update.branch_slug) {
                return Err(ApiError::forbidden());
            }
            let branch = dispatch
                .branch_dispatches
                .iter_mut()
                .find(|b| b.branch_slug == update.branch_slug)
                .ok_or_else(|| DispatchError::BranchNotFound(update.branch_slug.clone()))?;

            let completed_now = branch.apply(&update, &user.0.email, Utc::now())?;
            Ok((completed_now.then(|| branch.clone()), dispatch.parent_dispatch_id))
        })
        .await?;

    info!("Updated branch {} of dispatch {}", update.branch_slug, dispatch_id);

    if let (Some(branch), Some(parent_id)) = (completed_branch, parent_id) {
        // The follow-up itself is already saved; a failure here only leaves the
        // parent's items showing as scheduled.
        match resolve_parent_items(&state.pool, parent_id, &branch).await {
            Ok(resolved) => info!(
                "Resolved {} items of parent dispatch {} for branch {}",
                resolved, parent_id, branch.branch_slug
            ),
            Err(e) => error!(
                "Failed to resolve parent dispatch {} after follow-up {} completed: {}",
                parent_id, dispatch_id, e
            ),
        }
    }

    visible_to(&user, dispatch)
        .map(Json)
        .ok_or_else(ApiError::forbidden)
}

async fn resolve_parent_items(
    pool: &DbPool,
    parent_id: Uuid,
    completed: &BranchDispatch,
) -> ApiResult<usize> {
    let (resolved, _) = mutate_dispatch(pool, parent_id, |parent| {
        Ok(mark_resolved(&mut parent.branch_dispatches, completed))
    })
    .await?;
    Ok(resolved)
}

pub async fn create_follow_up(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<FollowUpRequest>,
) -> ApiResult<Json<Dispatch>> {
    user.require(SCHEDULE_PLANNERS)?;
    let branches = group_follow_up(&request.items)?;

    let follow_up = NewDispatch {
        id: Uuid::new_v4(),
        dispatch_date: request.dispatch_date.unwrap_or_else(|| Utc::now().date_naive()),
        created_by: user.0.email.clone(),
        branch_dispatches: serde_json::to_value(&branches)?,
        parent_dispatch_id: Some(request.parent_dispatch_id),
        follow_up_dispatch_ids: Vec::new(),
        notes: request.notes,
        version: 1,
    };

    let mut conn = state.pool.get().await?;
    let row = insert_follow_up(&mut conn, follow_up, branches).await?;

    info!(
        "Created follow-up dispatch {} for parent {} ({} items)",
        row.id,
        request.parent_dispatch_id,
        request.items.len()
    );
    Ok(Json(Dispatch::try_from(row)?))
}

/// Stores the follow-up and marks the replaced parent items in one
/// transaction, holding a row lock on the parent.
async fn insert_follow_up(
    conn: &mut AsyncPgConnection,
    follow_up: NewDispatch,
    branches: Vec<BranchDispatch>,
) -> ApiResult<DbDispatch> {
    conn.transaction::<_, ApiError, _>(|conn| {
        Box::pin(async move {
            let parent_id = follow_up
                .parent_dispatch_id
                .ok_or_else(|| ApiError::BadRequest("parentDispatchId is required".to_string()))?;
            let parent_row = dispatches::table
                .find(parent_id)
                .for_update()
                .first::<DbDispatch>(conn)
                .await
                .optional()?
                .ok_or_else(|| ApiError::NotFound(format!("dispatch {} not found", parent_id)))?;
            let mut parent = Dispatch::try_from(parent_row)?;

            let marked = mark_scheduled(&mut parent.branch_dispatches, &branches, follow_up.id);
            if marked == 0 {
                warn!("Follow-up {} matched no items of parent {}", follow_up.id, parent_id);
            }
            parent.follow_up_dispatch_ids.push(follow_up.id);

            let row = diesel::insert_into(dispatches::table)
                .values(&follow_up)
                .get_result::<DbDispatch>(conn)
                .await?;

            let parent_branches = serde_json::to_value(&parent.branch_dispatches)?;
            diesel::update(dispatches::table.filter(dispatches::id.eq(parent_id)))
                .set((
                    dispatches::branch_dispatches.eq(parent_branches),
                    dispatches::follow_up_dispatch_ids.eq(parent.follow_up_dispatch_ids.clone()),
                    dispatches::version.eq(parent.version + 1),
                    dispatches::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .await?;

            Ok(row)
        })
    })
    .await
}

pub async fn delete_dispatch(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(dispatch_id): ApiPath<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(OPERATIONS)?;
    let mut conn = state.pool.get().await?;
    let deleted = diesel::delete(dispatches::table.find(dispatch_id))
        .execute(&mut conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("dispatch {} not found", dispatch_id)));
    }

    info!("Deleted dispatch {} by {}", dispatch_id, user.0.email);
    Ok(Json(json!({ "deleted": true, "id": dispatch_id })))
}
