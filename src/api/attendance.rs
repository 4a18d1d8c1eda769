use actix_web::{HttpResponse, http::header, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ErrorBody},
    model::{
        attendance::{AttendanceEntry, Page},
        identity::IdentityKind,
    },
    report::{
        ReportQuery, ReportService,
        summary::{DailyCounts, DailyReport},
    },
};

/// Shared query string of the attendance reports.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceQuery {
    /// Single day; takes precedence over `from`/`to`
    #[param(value_type = Option<String>, format = "date", example = "2026-03-02")]
    pub date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    #[param(value_type = Option<String>, example = "learner")]
    pub kind: Option<IdentityKind>,
    pub cohort_id: Option<u64>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl From<&AttendanceQuery> for ReportQuery {
    fn from(q: &AttendanceQuery) -> Self {
        ReportQuery {
            date: q.date,
            from: q.from,
            to: q.to,
            kind: q.kind,
            cohort_id: q.cohort_id,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceEntry>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 20)]
    pub per_page: u64,
    #[schema(example = 57)]
    pub total: u64,
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance entries", body = AttendanceListResponse),
        (status = 400, description = "Invalid or too long range", body = ErrorBody),
        (status = 403, description = "Staff/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    reports: web::Data<ReportService>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let page = Page::new(query.page, query.per_page)
        .ok_or_else(|| ApiError::BadRequest("page out of range".to_string()))?;
    debug!(?query, "Fetching attendance entries");
    let (data, total) = reports
        .entries(&ReportQuery::from(&*query), page)
        .await
        .map_err(ApiError::from)?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data,
        page: page.number(),
        per_page: page.limit,
        total,
    }))
}

/// Daily report: counts, the day's records and the absentees.
#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Daily report", body = DailyReport),
        (status = 403, description = "Staff/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn daily_summary(
    auth: AuthUser,
    reports: web::Data<ReportService>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let report = reports
        .daily(&ReportQuery::from(&*query))
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/attendance/summary/range",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "One count row per day", body = [DailyCounts]),
        (status = 400, description = "Invalid or too long range", body = ErrorBody),
        (status = 403, description = "Staff/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn range_summary(
    auth: AuthUser,
    reports: web::Data<ReportService>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let days = reports
        .range(&ReportQuery::from(&*query))
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(days))
}

#[utoipa::path(
    get,
    path = "/api/attendance/export",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "CSV export", content_type = "text/csv", body = String),
        (status = 400, description = "Invalid or too long range", body = ErrorBody),
        (status = 403, description = "Staff/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn export_attendance(
    auth: AuthUser,
    reports: web::Data<ReportService>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let query = ReportQuery::from(&*query);
    let filter = reports.filter(&query).map_err(ApiError::from)?;
    let body = reports.export_csv(&query).await.map_err(ApiError::from)?;

    let filename = format!("attendance_{}_{}.csv", filter.from, filter.to);
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(body))
}
