use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_utils::test_utils::{TestConfig, TestUser};
use video_consult_cell::models::{SessionRole, VideoConsultError};
use video_consult_cell::services::binder::SessionBinder;

fn config_for(store: &MockServer, whereby: &MockServer) -> AppConfig {
    let mut test_config = TestConfig::with_store_url(&store.uri());
    test_config.whereby_api_base_url = whereby.uri();
    test_config.to_app_config()
}

fn appointment_row(
    appointment_id: Uuid,
    patient_id: &str,
    doctor_id: &str,
    room_url: Option<&str>,
    host_url: Option<&str>,
) -> serde_json::Value {
    json!([{
        "id": appointment_id,
        "patient_id": patient_id,
        "doctor_id": doctor_id,
        "date": "2025-09-01",
        "status": "confirmed",
        "video_room_url": room_url,
        "video_host_url": host_url,
        "video_room_id": room_url.map(|_| "existing-room")
    }])
}

async fn mock_appointment(
    store: &MockServer,
    appointment_id: Uuid,
    patient_id: &str,
    doctor_id: &str,
    room_url: Option<&str>,
    host_url: Option<&str>,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            room_url,
            host_url,
        )))
        .mount(store)
        .await;
}

fn meeting_response(id: &str) -> serde_json::Value {
    json!({
        "meetingId": id,
        "roomUrl": format!("https://example.whereby.com/{}", id),
        "hostRoomUrl": format!("https://example.whereby.com/{}?host=1", id)
    })
}

#[tokio::test]
async fn ensure_returns_existing_room_without_minting() {
    let store = MockServer::start().await;
    let whereby = MockServer::start().await;

    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4();

    mock_appointment(
        &store,
        appointment_id,
        &patient.id,
        &Uuid::new_v4().to_string(),
        Some("https://example.whereby.com/existing"),
        Some("https://example.whereby.com/existing?host=1"),
    )
    .await;

    // Idempotence: no meeting is created when one is already bound.
    Mock::given(method("POST"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(meeting_response("fresh")))
        .expect(0)
        .mount(&whereby)
        .await;

    let binder = SessionBinder::new(&config_for(&store, &whereby)).unwrap();
    let join = binder
        .ensure_session(&patient.to_user(), appointment_id, "test-token")
        .await
        .unwrap();

    assert_eq!(join.role, SessionRole::Guest);
    assert_eq!(join.join_url, "https://example.whereby.com/existing");
}

#[tokio::test]
async fn ensure_mints_and_persists_when_no_room_exists() {
    let store = MockServer::start().await;
    let whereby = MockServer::start().await;

    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4();

    mock_appointment(
        &store,
        appointment_id,
        &patient.id,
        &Uuid::new_v4().to_string(),
        None,
        None,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(meeting_response("room-1")))
        .expect(1)
        .mount(&whereby)
        .await;

    // Session fields are persisted in a small follow-up update.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "video_room_id": "room-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&store)
        .await;

    let binder = SessionBinder::new(&config_for(&store, &whereby)).unwrap();
    let join = binder
        .ensure_session(&patient.to_user(), appointment_id, "test-token")
        .await
        .unwrap();

    assert_eq!(join.join_url, "https://example.whereby.com/room-1");
}

#[tokio::test]
async fn doctor_without_host_url_gets_a_fresh_room() {
    let store = MockServer::start().await;
    let whereby = MockServer::start().await;

    let doctor = TestUser::doctor("doctor@example.com");
    let appointment_id = Uuid::new_v4();

    // Guest URL exists but the host URL was never captured.
    mock_appointment(
        &store,
        appointment_id,
        &Uuid::new_v4().to_string(),
        &doctor.id,
        Some("https://example.whereby.com/guest-only"),
        None,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(meeting_response("room-2")))
        .expect(1)
        .mount(&whereby)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;

    let binder = SessionBinder::new(&config_for(&store, &whereby)).unwrap();
    let join = binder
        .ensure_session(&doctor.to_user(), appointment_id, "test-token")
        .await
        .unwrap();

    assert_eq!(join.role, SessionRole::Host);
    assert_eq!(join.join_url, "https://example.whereby.com/room-2?host=1");
}

#[tokio::test]
async fn provider_outage_surfaces_without_touching_the_appointment() {
    let store = MockServer::start().await;
    let whereby = MockServer::start().await;

    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4();

    mock_appointment(
        &store,
        appointment_id,
        &patient.id,
        &Uuid::new_v4().to_string(),
        None,
        None,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&whereby)
        .await;

    // The appointment row must not be modified on provider failure.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&store)
        .await;

    let binder = SessionBinder::new(&config_for(&store, &whereby)).unwrap();
    let result = binder
        .ensure_session(&patient.to_user(), appointment_id, "test-token")
        .await;

    assert_matches!(result, Err(VideoConsultError::ProviderUnavailable { .. }));
}

#[tokio::test]
async fn regenerate_always_mints_a_new_room() {
    let store = MockServer::start().await;
    let whereby = MockServer::start().await;

    let doctor = TestUser::doctor("doctor@example.com");
    let appointment_id = Uuid::new_v4();

    // A room already exists; regeneration must still mint a new one.
    mock_appointment(
        &store,
        appointment_id,
        &Uuid::new_v4().to_string(),
        &doctor.id,
        Some("https://example.whereby.com/stale"),
        Some("https://example.whereby.com/stale?host=1"),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(meeting_response("fresh-room")))
        .expect(1)
        .mount(&whereby)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "video_room_id": "fresh-room" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&store)
        .await;

    let binder = SessionBinder::new(&config_for(&store, &whereby)).unwrap();
    let room = binder
        .regenerate_session(&doctor.to_user(), appointment_id, "test-token")
        .await
        .unwrap();

    assert_eq!(room.room_id, "fresh-room");
    assert_ne!(room.room_url, "https://example.whereby.com/stale");
}

#[tokio::test]
async fn outsiders_cannot_touch_the_session() {
    let store = MockServer::start().await;
    let whereby = MockServer::start().await;

    let stranger = TestUser::patient("other@example.com");
    let appointment_id = Uuid::new_v4();

    mock_appointment(
        &store,
        appointment_id,
        &Uuid::new_v4().to_string(),
        &Uuid::new_v4().to_string(),
        None,
        None,
    )
    .await;

    let binder = SessionBinder::new(&config_for(&store, &whereby)).unwrap();
    let result = binder
        .ensure_session(&stranger.to_user(), appointment_id, "test-token")
        .await;

    assert_matches!(result, Err(VideoConsultError::Unauthorized));
}

#[tokio::test]
async fn binder_requires_video_configuration() {
    let store = MockServer::start().await;

    let mut test_config = TestConfig::with_store_url(&store.uri());
    test_config.whereby_api_key = String::new();

    let result = SessionBinder::new(&test_config.to_app_config());
    assert_matches!(result, Err(VideoConsultError::NotConfigured));
}
