use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, CancelAppointmentRequest, RejectAppointmentRequest,
    RescheduleAppointmentRequest,
};
use appointment_cell::services::lifecycle::LifecycleService;
use shared_utils::test_utils::{MockStoreResponses, TestConfig, TestUser};

#[allow(clippy::too_many_arguments)]
fn appointment_row(
    id: Uuid,
    patient_id: &str,
    doctor_id: Uuid,
    slot_id: Option<Uuid>,
    date: &str,
    start: &str,
    end: &str,
    status: &str,
    reschedule_count: i32,
) -> serde_json::Value {
    json!({
        "id": id,
        "appointment_number": "APT-20250901-TEST",
        "patient_id": patient_id,
        "doctor_id": doctor_id,
        "time_slot_id": slot_id,
        "date": date,
        "start_time": start,
        "end_time": end,
        "status": status,
        "reason": "Routine checkup",
        "symptoms": "",
        "video_room_url": null,
        "video_host_url": null,
        "video_room_id": null,
        "cancellation_reason": null,
        "cancelled_by": null,
        "cancelled_at": null,
        "rescheduled_from": null,
        "reschedule_count": reschedule_count,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

struct Fixture {
    patient: TestUser,
    doctor: TestUser,
    doctor_id: Uuid,
    appointment_id: Uuid,
    slot_id: Uuid,
    /// A week out, comfortably outside the cancellation window.
    date: String,
}

impl Fixture {
    fn new() -> Self {
        let doctor = TestUser::doctor("doctor@example.com");
        let doctor_id = Uuid::parse_str(&doctor.id).unwrap();
        Self {
            patient: TestUser::patient("patient@example.com"),
            doctor,
            doctor_id,
            appointment_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            date: (Utc::now().date_naive() + Duration::days(7)).to_string(),
        }
    }

    fn row(&self, status: &str, reschedule_count: i32) -> serde_json::Value {
        appointment_row(
            self.appointment_id,
            &self.patient.id,
            self.doctor_id,
            Some(self.slot_id),
            &self.date,
            "10:00:00",
            "10:30:00",
            status,
            reschedule_count,
        )
    }

    async fn mock_appointment_fetch(&self, server: &MockServer, row: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("eq.{}", self.appointment_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
            .mount(server)
            .await;
    }

    async fn mock_slot_release(&self, server: &MockServer, slot_id: Uuid) {
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/time_slots"))
            .and(query_param("id", format!("eq.{}", slot_id)))
            .and(query_param("status", "eq.booked"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockStoreResponses::time_slot_response(
                    &slot_id.to_string(),
                    &self.doctor_id.to_string(),
                    &self.date,
                    "10:00:00",
                    "10:30:00",
                    "available",
                )
            ])))
            .expect(1)
            .mount(server)
            .await;
    }
}

fn lifecycle_service(server: &MockServer) -> LifecycleService {
    let config = TestConfig::with_store_url(&server.uri()).to_app_config();
    LifecycleService::new(&config)
}

fn valid_cancel_request() -> CancelAppointmentRequest {
    CancelAppointmentRequest {
        cancellation_reason: "Need to reschedule due to travel".to_string(),
    }
}

// ==============================================================================
// CANCEL
// ==============================================================================

#[tokio::test]
async fn cancelling_releases_the_slot() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("confirmed", 0))
        .await;

    let mut cancelled = fixture.row("cancelled", 0);
    cancelled["cancellation_reason"] = json!("Need to reschedule due to travel");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(pending,confirmed,in_progress)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .mount(&server)
        .await;

    fixture.mock_slot_release(&server, fixture.slot_id).await;

    let service = lifecycle_service(&server);
    let appointment = service
        .cancel(
            &fixture.patient.to_user(),
            fixture.appointment_id,
            valid_cancel_request(),
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn cancel_requires_a_meaningful_reason() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    let service = lifecycle_service(&server);
    let result = service
        .cancel(
            &fixture.patient.to_user(),
            fixture.appointment_id,
            CancelAppointmentRequest {
                cancellation_reason: "too busy".to_string(),
            },
            "test-token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::ValidationError(_)));
}

#[tokio::test]
async fn cancel_inside_the_window_is_a_policy_violation() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    // Starts in one hour.
    let soon = Utc::now() + Duration::hours(1);
    let row = appointment_row(
        fixture.appointment_id,
        &fixture.patient.id,
        fixture.doctor_id,
        Some(fixture.slot_id),
        &soon.date_naive().to_string(),
        &soon.time().format("%H:%M:%S").to_string(),
        &(soon + Duration::minutes(30)).time().format("%H:%M:%S").to_string(),
        "confirmed",
        0,
    );
    fixture.mock_appointment_fetch(&server, row).await;

    let service = lifecycle_service(&server);
    let result = service
        .cancel(
            &fixture.patient.to_user(),
            fixture.appointment_id,
            valid_cancel_request(),
            "test-token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::CancellationWindowClosed));
}

#[tokio::test]
async fn cancelling_a_completed_appointment_is_invalid() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("completed", 0))
        .await;

    let service = lifecycle_service(&server);
    let result = service
        .cancel(
            &fixture.patient.to_user(),
            fixture.appointment_id,
            valid_cancel_request(),
            "test-token",
        )
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Completed))
    );
}

#[tokio::test]
async fn strangers_cannot_cancel() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("confirmed", 0))
        .await;

    let stranger = TestUser::patient("other@example.com");
    let service = lifecycle_service(&server);
    let result = service
        .cancel(
            &stranger.to_user(),
            fixture.appointment_id,
            valid_cancel_request(),
            "test-token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized));
}

// ==============================================================================
// RESCHEDULE
// ==============================================================================

#[tokio::test]
async fn reschedule_swaps_slots_and_increments_the_counter() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();
    let new_slot_id = Uuid::new_v4();
    let new_date = (Utc::now().date_naive() + Duration::days(8)).to_string();

    fixture
        .mock_appointment_fetch(&server, fixture.row("confirmed", 0))
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("id", format!("eq.{}", new_slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::time_slot_response(
                &new_slot_id.to_string(),
                &fixture.doctor_id.to_string(),
                &new_date,
                "14:00:00",
                "14:30:00",
                "available",
            )
        ])))
        .mount(&server)
        .await;

    // Reserve the new slot.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("id", format!("eq.{}", new_slot_id)))
        .and(query_param("status", "eq.available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::time_slot_response(
                &new_slot_id.to_string(),
                &fixture.doctor_id.to_string(),
                &new_date,
                "14:00:00",
                "14:30:00",
                "booked",
            )
        ])))
        .expect(1)
        .mount(&server)
        .await;

    // Swap the appointment, counter re-checked in the filter.
    let updated = appointment_row(
        fixture.appointment_id,
        &fixture.patient.id,
        fixture.doctor_id,
        Some(new_slot_id),
        &new_date,
        "14:00:00",
        "14:30:00",
        "confirmed",
        1,
    );
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("reschedule_count", "eq.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated])))
        .mount(&server)
        .await;

    // Release the old slot.
    fixture.mock_slot_release(&server, fixture.slot_id).await;

    let service = lifecycle_service(&server);
    let appointment = service
        .reschedule(
            &fixture.patient.to_user(),
            fixture.appointment_id,
            RescheduleAppointmentRequest {
                new_time_slot_id: new_slot_id,
            },
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.reschedule_count, 1);
    assert_eq!(appointment.time_slot_id, Some(new_slot_id));
    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn reschedule_cap_is_enforced_regardless_of_timing() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("confirmed", 2))
        .await;

    let service = lifecycle_service(&server);
    let result = service
        .reschedule(
            &fixture.patient.to_user(),
            fixture.appointment_id,
            RescheduleAppointmentRequest {
                new_time_slot_id: Uuid::new_v4(),
            },
            "test-token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::RescheduleLimitReached));
}

#[tokio::test]
async fn reschedule_target_must_be_with_the_same_doctor() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();
    let new_slot_id = Uuid::new_v4();

    fixture
        .mock_appointment_fetch(&server, fixture.row("confirmed", 0))
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::time_slot_response(
                &new_slot_id.to_string(),
                &Uuid::new_v4().to_string(),
                &fixture.date,
                "14:00:00",
                "14:30:00",
                "available",
            )
        ])))
        .mount(&server)
        .await;

    let service = lifecycle_service(&server);
    let result = service
        .reschedule(
            &fixture.patient.to_user(),
            fixture.appointment_id,
            RescheduleAppointmentRequest {
                new_time_slot_id: new_slot_id,
            },
            "test-token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::SlotDoctorMismatch));
}

#[tokio::test]
async fn losing_the_reschedule_race_compensates_the_new_reservation() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();
    let new_slot_id = Uuid::new_v4();
    let new_date = (Utc::now().date_naive() + Duration::days(8)).to_string();

    fixture
        .mock_appointment_fetch(&server, fixture.row("confirmed", 0))
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::time_slot_response(
                &new_slot_id.to_string(),
                &fixture.doctor_id.to_string(),
                &new_date,
                "14:00:00",
                "14:30:00",
                "available",
            )
        ])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("status", "eq.available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::time_slot_response(
                &new_slot_id.to_string(),
                &fixture.doctor_id.to_string(),
                &new_date,
                "14:00:00",
                "14:30:00",
                "booked",
            )
        ])))
        .mount(&server)
        .await;

    // A concurrent cancel got there first: the conditional appointment
    // update matches nothing.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    // The freshly reserved slot must be given back.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("id", format!("eq.{}", new_slot_id)))
        .and(query_param("status", "eq.booked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::time_slot_response(
                &new_slot_id.to_string(),
                &fixture.doctor_id.to_string(),
                &new_date,
                "14:00:00",
                "14:30:00",
                "available",
            )
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let service = lifecycle_service(&server);
    let result = service
        .reschedule(
            &fixture.patient.to_user(),
            fixture.appointment_id,
            RescheduleAppointmentRequest {
                new_time_slot_id: new_slot_id,
            },
            "test-token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::ConcurrentUpdate));
}

#[tokio::test]
async fn only_the_patient_reschedules() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    let service = lifecycle_service(&server);
    let result = service
        .reschedule(
            &fixture.doctor.to_user(),
            fixture.appointment_id,
            RescheduleAppointmentRequest {
                new_time_slot_id: Uuid::new_v4(),
            },
            "test-token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized));
}

// ==============================================================================
// CONFIRM / REJECT / START / COMPLETE / NO-SHOW
// ==============================================================================

#[tokio::test]
async fn doctor_confirms_a_pending_appointment() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("pending", 0))
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fixture.row("confirmed", 0)])))
        .mount(&server)
        .await;

    let service = lifecycle_service(&server);
    let appointment = service
        .confirm(&fixture.doctor.to_user(), fixture.appointment_id, "test-token")
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn patients_cannot_confirm() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    let service = lifecycle_service(&server);
    let result = service
        .confirm(&fixture.patient.to_user(), fixture.appointment_id, "test-token")
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized));
}

#[tokio::test]
async fn rejecting_a_pending_appointment_frees_the_slot() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("pending", 0))
        .await;

    let mut rejected = fixture.row("cancelled", 0);
    rejected["cancellation_reason"] = json!("Fully booked that day");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([rejected])))
        .mount(&server)
        .await;

    fixture.mock_slot_release(&server, fixture.slot_id).await;

    let service = lifecycle_service(&server);
    let appointment = service
        .reject(
            &fixture.doctor.to_user(),
            fixture.appointment_id,
            RejectAppointmentRequest {
                reason: "Fully booked that day".to_string(),
            },
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn completing_an_in_progress_consultation() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("in_progress", 0))
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(confirmed,in_progress)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fixture.row("completed", 0)])))
        .mount(&server)
        .await;

    let service = lifecycle_service(&server);
    let appointment = service
        .complete(&fixture.doctor.to_user(), fixture.appointment_id, "test-token")
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn completing_a_pending_appointment_is_invalid() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("pending", 0))
        .await;

    let service = lifecycle_service(&server);
    let result = service
        .complete(&fixture.doctor.to_user(), fixture.appointment_id, "test-token")
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Pending))
    );
}

#[tokio::test]
async fn starting_a_confirmed_consultation() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    fixture
        .mock_appointment_fetch(&server, fixture.row("confirmed", 0))
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(pending,confirmed)"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([fixture.row("in_progress", 0)])),
        )
        .mount(&server)
        .await;

    let service = lifecycle_service(&server);
    let appointment = service
        .start(&fixture.doctor.to_user(), fixture.appointment_id, "test-token")
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::InProgress);
}

#[tokio::test]
async fn no_show_cannot_be_marked_before_the_grace_period() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    // Appointment is a week out; far too early for a no-show.
    fixture
        .mock_appointment_fetch(&server, fixture.row("confirmed", 0))
        .await;

    let service = lifecycle_service(&server);
    let result = service
        .mark_no_show(&fixture.doctor.to_user(), fixture.appointment_id, "test-token")
        .await;

    assert_matches!(result, Err(AppointmentError::ValidationError(_)));
}

#[tokio::test]
async fn no_show_after_the_grace_period() {
    let server = MockServer::start().await;
    let fixture = Fixture::new();

    let past = Utc::now() - Duration::hours(2);
    let row = appointment_row(
        fixture.appointment_id,
        &fixture.patient.id,
        fixture.doctor_id,
        Some(fixture.slot_id),
        &past.date_naive().to_string(),
        &past.time().format("%H:%M:%S").to_string(),
        &(past + Duration::minutes(30)).time().format("%H:%M:%S").to_string(),
        "confirmed",
        0,
    );
    fixture.mock_appointment_fetch(&server, row).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.confirmed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fixture.row("no_show", 0)])))
        .mount(&server)
        .await;

    let service = lifecycle_service(&server);
    let appointment = service
        .mark_no_show(&fixture.doctor.to_user(), fixture.appointment_id, "test-token")
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::NoShow);
}
