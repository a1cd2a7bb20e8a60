use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors, trace::TraceLayer};

use crate::auth::AuthConfig;
use crate::db::DbPool;
use crate::handlers::{analytics, dispatch, recipes, schedules, shortages, stations};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(pool: DbPool, auth: AuthConfig) -> Self {
        Self { pool, auth: Arc::new(auth) }
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/production-schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/production-schedules/:schedule_id",
            get(schedules::get_schedule).delete(schedules::delete_schedule),
        )
        .route("/production-schedules/items/assign", post(schedules::assign_item))
        .route("/production-schedules/items/reassign", post(schedules::reassign_item))
        .route("/production-schedules/items/start", post(schedules::start_item))
        .route("/production-schedules/items/complete", post(schedules::complete_item))
        .route("/production-schedules/items/adjust-quantity", post(schedules::adjust_quantity))
        .route("/production-schedules/items/reschedule", post(schedules::reschedule_item))
        .route(
            "/production-schedules/items/sub-recipe-progress",
            post(schedules::update_sub_recipe_progress),
        )
        .route("/stations/:station/tasks", get(stations::station_tasks))
        .route("/dispatch", get(dispatch::list_dispatches).post(dispatch::create_dispatch))
        .route("/dispatch/follow-up", post(dispatch::create_follow_up))
        .route(
            "/dispatch/:dispatch_id",
            get(dispatch::get_dispatch)
                .patch(dispatch::update_dispatch)
                .delete(dispatch::delete_dispatch),
        )
        .route("/inventory-shortages", get(shortages::list_shortages))
        .route("/inventory-shortages/:shortage_id/resolve", patch(shortages::resolve_shortage))
        .route("/analytics/sales", get(analytics::sales_summary))
        .route("/analytics/waste", get(analytics::waste_summary))
        .route("/analytics/waste/variance", get(analytics::branch_variance))
        .route("/recipes", get(recipes::list_recipes))
        .route("/recipes/fix-ids", post(recipes::fix_recipe_ids))
        .route(
            "/recipes/:recipe_id",
            get(recipes::get_recipe).put(recipes::put_recipe).delete(recipes::delete_recipe),
        )
        .route(
            "/recipes/:recipe_id/instructions",
            get(recipes::get_instructions).put(recipes::put_instructions),
        );

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods(cors::Any)
                .allow_headers(cors::Any),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}
