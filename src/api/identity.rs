use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    attendance::{AttendanceService, payload},
    auth::auth::AuthUser,
    error::{ApiError, ErrorBody},
    model::{
        attendance::Page,
        identity::{Identity, IdentityFilter, IdentityKind, NewIdentity},
    },
    store::Store,
};

#[derive(Deserialize, ToSchema)]
pub struct CreateIdentity {
    pub kind: IdentityKind,
    #[schema(example = "APP-2026-0001")]
    pub matricule: String,
    #[schema(example = "Awa")]
    pub first_name: String,
    #[schema(example = "Diop")]
    pub last_name: String,
    #[schema(example = "awa.diop@example.com", format = "email", nullable = true)]
    pub email: Option<String>,
    #[schema(example = 4, nullable = true)]
    pub cohort_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IdentityQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    #[param(value_type = Option<String>, example = "learner")]
    pub kind: Option<IdentityKind>,
    pub cohort_id: Option<u64>,
    pub active: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct IdentityListResponse {
    pub data: Vec<Identity>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 20)]
    pub per_page: u64,
    #[schema(example = 120)]
    pub total: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct SetActive {
    #[schema(example = false)]
    pub active: bool,
}

fn not_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/identities",
    request_body = CreateIdentity,
    responses(
        (status = 201, description = "Identity created with its QR payload", body = Identity),
        (status = 400, description = "Invalid matricule or missing name", body = ErrorBody),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Matricule already exists", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Identities"
)]
pub async fn create_identity(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    body: web::Json<CreateIdentity>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    let body = body.into_inner();

    let matricule = body.matricule.trim();
    if !payload::is_valid_matricule(matricule) {
        return Err(ApiError::BadRequest(
            "matricule must be 2-64 letters, digits, '-' or '_'".to_string(),
        )
        .into());
    }
    not_blank("first_name", &body.first_name)?;
    not_blank("last_name", &body.last_name)?;

    let first_name = body.first_name.trim();
    let last_name = body.last_name.trim();
    let identity = store
        .create_identity(NewIdentity {
            kind: body.kind,
            matricule: matricule.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: body.email.filter(|e| !e.trim().is_empty()),
            cohort_id: body.cohort_id,
            qr_payload: payload::encode(body.kind, matricule, first_name, last_name),
            created_at: Utc::now(),
        })
        .await
        .map_err(ApiError::from)?;

    info!(id = identity.id, kind = %identity.kind, created_by = auth.user_id, "Identity created");
    Ok(HttpResponse::Created().json(identity))
}

#[utoipa::path(
    get,
    path = "/api/identities/{id}",
    params(("id" = u64, Path, description = "Identity id")),
    responses(
        (status = 200, description = "Identity found", body = Identity),
        (status = 404, description = "Identity not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Identities"
)]
pub async fn get_identity(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    match store.find_identity(path.into_inner()).await.map_err(ApiError::from)? {
        Some(identity) => Ok(HttpResponse::Ok().json(identity)),
        None => Err(ApiError::NotFound("identity not found").into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/identities",
    params(IdentityQuery),
    responses(
        (status = 200, description = "Paginated identities", body = IdentityListResponse),
        (status = 403, description = "Staff/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Identities"
)]
pub async fn list_identities(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<IdentityQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let page = Page::new(query.page, query.per_page)
        .ok_or_else(|| ApiError::BadRequest("page out of range".to_string()))?;
    let filter = IdentityFilter {
        kind: query.kind,
        cohort_id: query.cohort_id,
        active: query.active,
    };
    debug!(?filter, limit = page.limit, offset = page.offset, "Fetching identities");

    let total = store.count_identities(&filter).await.map_err(ApiError::from)?;
    let data = store
        .list_identities(&filter, Some(page))
        .await
        .map_err(ApiError::from)?;

    Ok(HttpResponse::Ok().json(IdentityListResponse {
        data,
        page: page.number(),
        per_page: page.limit,
        total,
    }))
}

/// Payload to print as the identity's QR code.
#[utoipa::path(
    get,
    path = "/api/identities/{id}/qr",
    params(("id" = u64, Path, description = "Identity id")),
    responses(
        (status = 200, description = "QR payload", body = Object, example = json!({
            "matricule": "APP-2026-0001",
            "payload": "{\"v\":1,\"kind\":\"learner\",\"matricule\":\"APP-2026-0001\",\"first_name\":\"Awa\",\"last_name\":\"Diop\"}"
        })),
        (status = 404, description = "Identity not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Identities"
)]
pub async fn identity_qr(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let identity = store
        .find_identity(path.into_inner())
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::NotFound("identity not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "matricule": identity.matricule,
        "payload": identity.qr_payload,
    })))
}

#[utoipa::path(
    put,
    path = "/api/identities/{id}/active",
    params(("id" = u64, Path, description = "Identity id")),
    request_body = SetActive,
    responses(
        (status = 200, description = "Identity updated", body = Identity),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Identity not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Identities"
)]
pub async fn set_identity_active(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
    body: web::Json<SetActive>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    if !store
        .set_identity_active(id, body.active)
        .await
        .map_err(ApiError::from)?
    {
        return Err(ApiError::NotFound("identity not found").into());
    }

    let identity = store
        .find_identity(id)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::NotFound("identity not found"))?;

    // scans must see the new flag immediately
    service.resolver().invalidate(&identity.matricule).await;

    info!(id, active = body.active, updated_by = auth.user_id, "Identity activation changed");
    Ok(HttpResponse::Ok().json(identity))
}
