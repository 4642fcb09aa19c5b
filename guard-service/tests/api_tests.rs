use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{NaiveTime, Weekday};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use guard_service::{
    api::{self, state::GuardAppState},
    domain::{
        config::ServiceConfig, escalation::EscalationEngine,
        notification::MockNotificationDispatcher, roster::MockRosterClient, roster::RosterClient,
        service::GuardService,
    },
    infrastructure::memory::InMemoryStore,
};
use shared::types::{EmploymentType, GuardType, Member, MemberStatus};

fn make_member(name: &str) -> Member {
    Member {
        id: Uuid::new_v4(),
        tenant_id: Uuid::nil(),
        name: name.to_string(),
        status: MemberStatus::Active,
        employment: EmploymentType::PartTime,
        is_officer: false,
        is_acting_officer: false,
        competencies: vec![],
        weekly_hour_cap: 40.0,
    }
}

fn make_guard() -> GuardType {
    GuardType {
        id: Uuid::new_v4(),
        tenant_id: Uuid::nil(),
        name: "Jour".to_string(),
        start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        stored_duration_hours: Some(8.0),
        weekdays: vec![Weekday::Mon, Weekday::Tue],
        required_headcount: 1,
        officer_required: false,
        required_competencies: vec![],
        is_external: false,
        external_hourly_rate: None,
        active: true,
    }
}

fn build_test_app(members: Vec<Member>, guards: Vec<GuardType>) -> Router {
    let mut roster = MockRosterClient::new();
    roster
        .expect_get_members()
        .returning(move |_| Ok(members.clone()));
    roster
        .expect_get_guard_types()
        .returning(move |_| Ok(guards.clone()));
    let roster: Arc<dyn RosterClient> = Arc::new(roster);

    let mut notifier = MockNotificationDispatcher::new();
    notifier.expect_send_offer().returning(|_| Ok(()));

    let store = Arc::new(InMemoryStore::new());
    let config = ServiceConfig {
        timezone: "UTC".to_string(),
        ..ServiceConfig::default()
    };
    let escalation = EscalationEngine::new(
        roster.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(notifier),
        &config,
    );
    let service = Arc::new(GuardService::new(
        roster,
        store.clone(),
        store.clone(),
        store,
        escalation,
        &config,
    ));

    api::routes(Arc::new(GuardAppState::new(service)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn tenant_uri(path: &str) -> String {
    format!("/api/v1/tenants/{}{path}", Uuid::nil())
}

#[tokio::test]
async fn parameters_round_trip_through_put_and_get() {
    let app = build_test_app(vec![], vec![]);

    let (status, json) = send(
        &app,
        "PUT",
        &tenant_uri("/parameters"),
        Some(json!({
            "auto_attribution_enabled": true,
            "simultaneous_offers": 3,
            "wait_delay_hours": 12.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["success"].as_bool().unwrap());

    let (status, json) = send(&app, "GET", &tenant_uri("/parameters"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["simultaneous_offers"], 3);
    assert_eq!(json["data"]["availability_model"], "declared");
}

#[tokio::test]
async fn missing_parameters_return_404() {
    let app = build_test_app(vec![], vec![]);

    let (status, json) = send(&app, "GET", &tenant_uri("/parameters"), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!json["success"].as_bool().unwrap());
}

#[tokio::test]
async fn invalid_parameters_return_400() {
    let app = build_test_app(vec![], vec![]);

    let (status, _) = send(
        &app,
        "PUT",
        &tenant_uri("/parameters"),
        Some(json!({ "simultaneous_offers": 0 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn attribution_run_without_parameters_reports_disabled() {
    let app = build_test_app(vec![make_member("Alix")], vec![make_guard()]);

    let (status, json) = send(
        &app,
        "POST",
        &tenant_uri("/attribution-runs"),
        Some(json!({ "week_start": "2025-12-01", "week_end": "2025-12-07" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["disabled"], true);
    assert_eq!(json["data"]["assignments_created"], 0);
}

#[tokio::test]
async fn inverted_attribution_range_returns_400() {
    let app = build_test_app(vec![], vec![]);

    let (status, _) = send(
        &app,
        "POST",
        &tenant_uri("/attribution-runs"),
        Some(json!({ "week_start": "2025-12-07", "week_end": "2025-12-01" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn attribution_run_fills_and_lists_assignments() {
    let app = build_test_app(
        vec![make_member("Alix"), make_member("Bastien")],
        vec![make_guard()],
    );
    send(
        &app,
        "PUT",
        &tenant_uri("/parameters"),
        Some(json!({ "auto_attribution_enabled": true, "availability_model": "implicit" })),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        &tenant_uri("/attribution-runs"),
        Some(json!({ "week_start": "2025-12-01", "week_end": "2025-12-07" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["assignments_created"], 2);
    assert_eq!(json["data"]["dates_processed"].as_array().unwrap().len(), 7);

    let (status, json) = send(
        &app,
        "GET",
        &tenant_uri("/assignments?from=2025-12-01&to=2025-12-07"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let assignments = json["data"].as_array().unwrap();
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignments[0]["origin"], "auto");
    assert_eq!(assignments[0]["justification"]["kind"], "rule_selected");
}

#[tokio::test]
async fn conflicting_availability_returns_409_with_existing_record() {
    let member = make_member("Alix");
    let app = build_test_app(vec![member.clone()], vec![]);
    let uri = tenant_uri(&format!("/members/{}/availabilities", member.id));

    let (status, first) = send(
        &app,
        "POST",
        &uri,
        Some(json!({
            "date": "2025-12-01",
            "status": "available",
            "start_time": "08:00:00",
            "end_time": "16:00:00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &app,
        "POST",
        &uri,
        Some(json!({
            "date": "2025-12-01",
            "status": "unavailable",
            "start_time": "12:00:00",
            "end_time": "18:00:00"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!json["success"].as_bool().unwrap());
    assert_eq!(json["data"]["kind"], "availability");
    assert_eq!(json["data"]["existing"]["id"], first["data"]["id"]);
}

#[tokio::test]
async fn bulk_generation_reports_created_and_skipped() {
    let member = make_member("Alix");
    let app = build_test_app(vec![member.clone()], vec![]);
    let uri = tenant_uri(&format!("/members/{}/availabilities/generate", member.id));
    let body = json!({
        "from": "2025-12-01",
        "to": "2025-12-07",
        "pattern": { "status": "available", "cycle": [true, false] }
    });

    let (status, json) = send(&app, "POST", &uri, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["created"], 4);

    let (_, json) = send(&app, "POST", &uri, Some(body)).await;
    assert_eq!(json["data"]["created"], 0);
    assert_eq!(json["data"]["skipped"], 4);

    let (status, json) = send(
        &app,
        "POST",
        &tenant_uri(&format!("/members/{}/availabilities/reset", member.id)),
        Some(json!({ "from": "2025-12-01", "to": "2025-12-07", "source": "auto" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["removed"], 4);
}

#[tokio::test]
async fn manual_assignment_double_booking_returns_409() {
    let member = make_member("Alix");
    let guard = make_guard();
    let app = build_test_app(vec![member.clone()], vec![guard.clone()]);
    let body = json!({
        "member_id": member.id,
        "guard_type_id": guard.id,
        "date": "2025-12-01"
    });

    let (status, json) = send(&app, "POST", &tenant_uri("/assignments"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["origin"], "manual");
    assert_eq!(json["data"]["justification"]["kind"], "manual_override");

    let (status, json) = send(&app, "POST", &tenant_uri("/assignments"), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["data"]["kind"], "assignment");
}

#[tokio::test]
async fn cancel_without_replacement_returns_no_request() {
    let member = make_member("Alix");
    let guard = make_guard();
    let app = build_test_app(vec![member.clone()], vec![guard.clone()]);
    let (_, created) = send(
        &app,
        "POST",
        &tenant_uri("/assignments"),
        Some(json!({
            "member_id": member.id,
            "guard_type_id": guard.id,
            "date": "2025-12-02"
        })),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        "POST",
        &tenant_uri(&format!("/assignments/{id}/cancel")),
        Some(json!({ "reason": "erreur de saisie", "find_replacement": false })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["data"].is_null());
}

#[tokio::test]
async fn flag_gap_returns_202_and_an_open_request() {
    let guard = make_guard();
    let app = build_test_app(vec![], vec![guard.clone()]);

    let (status, json) = send(
        &app,
        "POST",
        &tenant_uri("/replacements"),
        Some(json!({
            "guard_type_id": guard.id,
            "date": "2030-01-07",
            "reason": "Sous-effectif"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["status"], "pending");
    assert!(json["data"]["requester_id"].is_null());
}

#[tokio::test]
async fn flag_gap_for_unknown_guard_type_returns_404() {
    let app = build_test_app(vec![], vec![]);

    let (status, _) = send(
        &app,
        "POST",
        &tenant_uri("/replacements"),
        Some(json!({
            "guard_type_id": Uuid::new_v4(),
            "date": "2030-01-07",
            "reason": "Sous-effectif"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_replacement_returns_404() {
    let app = build_test_app(vec![], vec![]);

    let (status, json) = send(
        &app,
        "GET",
        &tenant_uri(&format!("/replacements/{}", Uuid::new_v4())),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!json["success"].as_bool().unwrap());
}

#[tokio::test]
async fn answer_without_outstanding_offer_returns_409() {
    let guard = make_guard();
    let app = build_test_app(vec![], vec![guard.clone()]);
    let (_, created) = send(
        &app,
        "POST",
        &tenant_uri("/replacements"),
        Some(json!({
            "guard_type_id": guard.id,
            "date": "2030-01-07",
            "reason": "Sous-effectif"
        })),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &tenant_uri(&format!("/replacements/{id}/accept")),
        Some(json!({ "member_id": Uuid::new_v4() })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn expired_requests_are_listed_by_status() {
    let guard = make_guard();
    let app = build_test_app(vec![], vec![guard.clone()]);
    let (_, created) = send(
        &app,
        "POST",
        &tenant_uri("/replacements"),
        Some(json!({
            "guard_type_id": guard.id,
            "date": "2030-01-07",
            "reason": "Sous-effectif"
        })),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    send(
        &app,
        "POST",
        &tenant_uri(&format!("/replacements/{id}/expire")),
        None,
    )
    .await;

    let (status, expired) =
        send(&app, "GET", &tenant_uri("/replacements?status=expired"), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = expired["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());
    assert_eq!(listed[0]["status"], "expired");

    let (_, open) = send(&app, "GET", &tenant_uri("/replacements"), None).await;
    assert!(open["data"].as_array().unwrap().is_empty());
}
