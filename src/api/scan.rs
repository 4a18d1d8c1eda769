use actix_web::{HttpResponse, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    attendance::{
        AttendanceService, ScanOutcome, Transition,
        meal::{MealOutcome, MealSummary},
    },
    auth::auth::AuthUser,
    error::{ApiError, ErrorBody},
    model::{
        identity::{Identity, IdentityKind},
        meal::MealKind,
    },
};

const MAX_PAYLOAD_LEN: usize = 2048;

/// Body posted by a scanning station. The scan time is always the server's.
#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ScanRequest {
    /// Raw text decoded from the QR code
    #[schema(example = "{\"v\":1,\"kind\":\"learner\",\"matricule\":\"APP-2026-0001\"}")]
    pub payload: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MealScanRequest {
    #[schema(example = "APP-2026-0001")]
    pub payload: String,
    pub meal: MealKind,
}

#[derive(Serialize, ToSchema)]
pub struct ScannedIdentity {
    pub id: u64,
    pub kind: IdentityKind,
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<Identity> for ScannedIdentity {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            kind: identity.kind,
            matricule: identity.matricule,
            first_name: identity.first_name,
            last_name: identity.last_name,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[schema(example = json!({
    "transition": "checkin",
    "message": "Checked in",
    "identity": {
        "id": 1,
        "kind": "learner",
        "matricule": "APP-2026-0001",
        "first_name": "Awa",
        "last_name": "Diop"
    },
    "date": "2026-03-02",
    "check_in": "2026-03-02T08:55:00Z",
    "check_out": null,
    "is_late": false
}))]
pub struct ScanResponse {
    pub transition: Transition,
    /// Toast text for the scanning UI
    pub message: &'static str,
    pub identity: ScannedIdentity,
    #[schema(format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(format = "date-time", value_type = String)]
    pub check_in: DateTime<Utc>,
    #[schema(format = "date-time", value_type = String, nullable = true)]
    pub check_out: Option<DateTime<Utc>>,
    pub is_late: bool,
}

impl From<ScanOutcome> for ScanResponse {
    fn from(outcome: ScanOutcome) -> Self {
        let message = match (outcome.transition, outcome.record.is_late) {
            (Transition::CheckIn, false) => "Checked in",
            (Transition::CheckIn, true) => "Checked in late",
            (Transition::CheckOut, _) => "Checked out",
            (Transition::AlreadyCheckedIn, _) => "Already checked in today",
            (Transition::AlreadyCheckedOut, _) => "Already checked out today",
        };

        Self {
            transition: outcome.transition,
            message,
            identity: outcome.identity.into(),
            date: outcome.record.date,
            check_in: outcome.record.check_in,
            check_out: outcome.record.check_out,
            is_late: outcome.record.is_late,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MealScanResponse {
    pub outcome: MealOutcome,
    pub meal: MealKind,
    pub message: &'static str,
    pub identity: ScannedIdentity,
}

fn check_len(payload: &str) -> Result<(), ApiError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ApiError::BadRequest(format!(
            "payload longer than {MAX_PAYLOAD_LEN} bytes"
        )));
    }
    Ok(())
}

/// Attendance scan: first of the day checks in, second checks out.
#[utoipa::path(
    post,
    path = "/api/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Scan applied or reported", body = ScanResponse),
        (status = 400, description = "Invalid QR code", body = ErrorBody),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Identity inactive", body = ErrorBody),
        (status = 404, description = "Identity not found", body = ErrorBody),
        (status = 409, description = "Check-out not after check-in", body = ErrorBody),
        (status = 503, description = "Storage unavailable, retry", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
#[instrument(name = "scan", skip_all, fields(station = %auth.username))]
pub async fn scan(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ScanRequest>,
) -> Result<HttpResponse, ApiError> {
    check_len(&body.payload)?;

    let outcome = service.scan(&body.payload).await?;
    info!(
        owner_id = outcome.identity.id,
        transition = ?outcome.transition,
        from_station = auth.is_scanner(),
        "Scan processed"
    );

    Ok(HttpResponse::Ok().json(ScanResponse::from(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/scan/meal",
    request_body = MealScanRequest,
    responses(
        (status = 200, description = "Meal served or already served", body = MealScanResponse),
        (status = 400, description = "Invalid QR code", body = ErrorBody),
        (status = 403, description = "Not eligible for meals", body = ErrorBody),
        (status = 404, description = "Identity not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
#[instrument(name = "scan_meal", skip_all, fields(station = %_auth.username, meal = %body.meal))]
pub async fn scan_meal(
    _auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<MealScanRequest>,
) -> Result<HttpResponse, ApiError> {
    check_len(&body.payload)?;

    let (outcome, identity) = service.scan_meal(&body.payload, body.meal).await?;
    let message = match outcome {
        MealOutcome::Served => "Enjoy your meal",
        MealOutcome::AlreadyServed => "Meal already served today",
    };

    Ok(HttpResponse::Ok().json(MealScanResponse {
        outcome,
        meal: body.meal,
        message,
        identity: identity.into(),
    }))
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MealSummaryQuery {
    /// Day to summarise, defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/api/meals/summary",
    params(MealSummaryQuery),
    responses(
        (status = 200, description = "Meals served per kind", body = MealSummary),
        (status = 403, description = "Staff/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn meal_summary(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<MealSummaryQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;
    let summary = service.meal_summary(query.date).await.map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(summary))
}
