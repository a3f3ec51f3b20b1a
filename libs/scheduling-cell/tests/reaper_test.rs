use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::{Actor, AdmissionError};
use scheduling_cell::services::reaper::ReaperService;
use shared_utils::test_utils::{MockPostgrestRows, TestConfig};

const TOKEN: &str = "test-token";

fn at(date: NaiveDate, time: &str) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time.parse().unwrap()))
}

async fn service(mock_server: &MockServer) -> ReaperService {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    ReaperService::new(&config)
}

#[tokio::test]
async fn sweep_deletes_only_missed_rows() {
    let mock_server = MockServer::start().await;
    let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
    let today_s = today.to_string();

    let missed_a = Uuid::new_v4();
    let missed_b = Uuid::new_v4();
    let future = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_date", format!("eq.{}", today)))
        .and(query_param("status", "neq.COMPLETED"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestRows::appointment_row(
                &missed_a.to_string(), "APT-20260823-001", &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(), &today_s, 1, Some("09:00:00"), "CONFIRMED",
            ),
            MockPostgrestRows::appointment_row(
                &missed_b.to_string(), "APT-20260823-002", &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(), &today_s, 2, Some("09:10:00"), "PENDING",
            ),
            MockPostgrestRows::appointment_row(
                &future.to_string(), "APT-20260823-003", &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(), &today_s, 3, Some("14:00:00"), "CONFIRMED",
            ),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("in.({},{})", missed_a, missed_b)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": missed_a }, { "id": missed_b }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let reaper = service(&mock_server).await;
    let deleted = reaper
        .sweep_today(at(today, "12:00:00"), TOKEN)
        .await
        .expect("sweep should succeed");

    assert_eq!(deleted, 2);
}

#[tokio::test]
async fn sweep_with_nothing_missed_deletes_nothing() {
    let mock_server = MockServer::start().await;
    let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestRows::appointment_row(
                &Uuid::new_v4().to_string(), "APT-20260823-001", &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(), &today.to_string(), 1, Some("14:00:00"), "CONFIRMED",
            ),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let reaper = service(&mock_server).await;
    let deleted = reaper
        .sweep_today(at(today, "09:00:00"), TOKEN)
        .await
        .expect("sweep should succeed");

    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn delete_if_missed_rejects_strangers_and_live_rows() {
    let mock_server = MockServer::start().await;
    let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    // Slot at 14:00; at noon the row is live, not missed.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestRows::appointment_row(
                &appointment_id.to_string(), "APT-20260823-001", &Uuid::new_v4().to_string(),
                &patient_id.to_string(), &today.to_string(), 1, Some("14:00:00"), "CONFIRMED",
            ),
        ])))
        .mount(&mock_server)
        .await;

    let reaper = service(&mock_server).await;
    let now = at(today, "12:00:00");

    let stranger = Actor::Patient { user_id: Uuid::new_v4() };
    let result = reaper.delete_if_missed(&stranger, appointment_id, now, TOKEN).await;
    assert_matches!(result, Err(AdmissionError::Forbidden(_)));

    // Admins are not a party to the appointment.
    let admin = Actor::Admin { user_id: Uuid::new_v4() };
    let result = reaper.delete_if_missed(&admin, appointment_id, now, TOKEN).await;
    assert_matches!(result, Err(AdmissionError::Forbidden(_)));

    let owner = Actor::Patient { user_id: patient_id };
    let result = reaper.delete_if_missed(&owner, appointment_id, now, TOKEN).await;
    assert_matches!(result, Err(AdmissionError::NotMissed));
}

#[tokio::test]
async fn delete_if_missed_removes_a_missed_row() {
    let mock_server = MockServer::start().await;
    let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestRows::appointment_row(
                &appointment_id.to_string(), "APT-20260823-001", &Uuid::new_v4().to_string(),
                &patient_id.to_string(), &today.to_string(), 1, Some("09:00:00"), "CONFIRMED",
            ),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": appointment_id }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let reaper = service(&mock_server).await;
    let owner = Actor::Patient { user_id: patient_id };

    reaper
        .delete_if_missed(&owner, appointment_id, at(today, "09:25:00"), TOKEN)
        .await
        .expect("delete should succeed");
}

#[tokio::test]
async fn delete_if_missed_unknown_row_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let reaper = service(&mock_server).await;
    let actor = Actor::Patient { user_id: Uuid::new_v4() };

    let result = reaper
        .delete_if_missed(&actor, Uuid::new_v4(), Utc::now(), TOKEN)
        .await;
    assert_matches!(result, Err(AdmissionError::NotFound(_)));
}
