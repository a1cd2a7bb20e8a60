mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::json;
use shared::Role;

#[tokio::test]
async fn health_check_answers_ok() {
    let app = offline_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn api_requires_a_bearer_token() {
    let app = offline_app();
    let (status, body) = send(&app, Method::GET, "/api/production-schedules", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication required");

    let (status, _) = send(&app, Method::GET, "/api/recipes", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() {
    let app = offline_app();
    let forged = catering_service::auth::AuthConfig::new("other-secret")
        .issue("u1", &actor(Role::Admin), chrono::Duration::hours(1))
        .unwrap();
    let (status, _) = send(&app, Method::GET, "/api/dispatch", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn planning_routes_reject_other_roles() {
    let app = offline_app();
    let staff = token_for(&actor(Role::Staff));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/production-schedules/items/assign",
        Some(&staff),
        Some(json!({
            "scheduleId": "w1",
            "date": "2024-03-04",
            "itemId": "i1",
            "station": "grill"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/inventory-shortages/{}/resolve", uuid::Uuid::new_v4()),
        Some(&token_for(&actor(Role::BranchManager))),
        Some(json!({ "resolutionStatus": "RESOLVED" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_only_routes() {
    let app = offline_app();
    let chef = token_for(&actor(Role::HeadChef));

    let (status, _) = send(&app, Method::POST, "/api/recipes/fix-ids", Some(&chef), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/recipes/chicken-curry",
        Some(&chef),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/dispatch/{}", uuid::Uuid::new_v4()),
        Some(&chef),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn station_staff_cannot_read_other_stations() {
    let app = offline_app();
    let mut cook = actor(Role::StationStaff);
    cook.station_assignment = Some("Hot Kitchen".to_string());

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/stations/pastry/tasks?date=2024-03-04",
        Some(&token_for(&cook)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn analytics_validates_the_period() {
    let app = offline_app();
    let admin = token_for(&actor(Role::Admin));

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/analytics/sales?start=2024-03-10&end=2024-03-01",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "start must not be after end");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/analytics/waste?start=yesterday&end=2024-03-01",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let manager = token_for(&actor(Role::BranchManager));
    let (status, _) = send(
        &app,
        Method::GET,
        "/api/analytics/waste/variance?start=2024-03-01&end=2024-03-07&branch=Airport",
        Some(&manager),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = offline_app();
    let admin = token_for(&actor(Role::Admin));
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/dispatch/follow-up",
        Some(&admin),
        Some(json!({ "items": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn sales_period_without_a_representable_predecessor_is_rejected() {
    let app = offline_app();
    let admin = token_for(&actor(Role::Admin));
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/analytics/sales?start=-200000-01-01&end=%2B200000-01-01",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "period is out of range");
}
