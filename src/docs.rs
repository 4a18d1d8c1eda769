use crate::{
    api::{
        attendance::AttendanceListResponse,
        identity::{CreateIdentity, IdentityListResponse, SetActive},
        scan::{MealScanRequest, MealScanResponse, ScanRequest, ScanResponse, ScannedIdentity},
    },
    attendance::{
        Transition,
        meal::{MealCount, MealOutcome, MealSummary},
    },
    auth::handlers::SetUserActive,
    error::ErrorBody,
    model::{
        attendance::{AttendanceEntry, AttendanceRecord},
        identity::{Identity, IdentityKind},
        meal::MealKind,
        role::Role,
    },
    models::{LoginReqDto, TokenPair, UserReq},
    report::summary::{AbsentIdentity, DailyCounts, DailyReport},
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Training Center Attendance API",
        version = "1.0.0",
        description = r#"
## Attendance tracking for a training center

Learners and coaches carry a QR code. Scanning stations post the decoded
payload; the server decides, at its own clock, whether the scan is a
**check-in** or a **check-out** for the current day.

### Key Features
- **Scan**: one check-in and one check-out per person per day, lateness
  computed against the cohort cutoff
- **Meals**: one breakfast, lunch and dinner per learner per day
- **Reports**: daily and range summaries, absentees, CSV export
- **Identities**: learner/coach records and their QR payloads

### Security
Every `/api` endpoint requires a **JWT Bearer** access token.
Scanner accounts may only scan; reports need **Staff** or **Admin**.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::create_user,
        crate::auth::handlers::set_user_active,

        crate::api::scan::scan,
        crate::api::scan::scan_meal,
        crate::api::scan::meal_summary,

        crate::api::identity::create_identity,
        crate::api::identity::get_identity,
        crate::api::identity::list_identities,
        crate::api::identity::identity_qr,
        crate::api::identity::set_identity_active,

        crate::api::attendance::list_attendance,
        crate::api::attendance::daily_summary,
        crate::api::attendance::range_summary,
        crate::api::attendance::export_attendance
    ),
    components(
        schemas(
            ErrorBody,
            LoginReqDto,
            TokenPair,
            UserReq,
            SetUserActive,
            Role,
            ScanRequest,
            ScanResponse,
            ScannedIdentity,
            Transition,
            MealScanRequest,
            MealScanResponse,
            MealOutcome,
            MealKind,
            MealCount,
            MealSummary,
            Identity,
            IdentityKind,
            CreateIdentity,
            SetActive,
            IdentityListResponse,
            AttendanceRecord,
            AttendanceEntry,
            AttendanceListResponse,
            DailyCounts,
            DailyReport,
            AbsentIdentity
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token rotation and operator accounts"),
        (name = "Scan", description = "QR check-in/check-out and meal scans"),
        (name = "Identities", description = "Learner and coach administration"),
        (name = "Attendance", description = "Attendance reports and exports"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/scan",
            "/api/scan/meal",
            "/api/identities/{id}/active",
            "/api/users/{id}/active",
            "/api/attendance/summary/range",
            "/api/attendance/export",
            "/auth/refresh",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }

        let schemes = doc.components.map(|c| c.security_schemes).unwrap_or_default();
        assert!(schemes.contains_key("bearer_auth"));
    }
}
