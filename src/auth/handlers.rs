use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::{role::Role, user::NewUser},
    models::{LoginReqDto, TokenPair, TokenType, UserReq},
    store::{Store, StoreError},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, error, info, instrument};

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Issues an access/refresh pair and records the refresh `jti`.
async fn issue_pair(
    store: &dyn Store,
    config: &Config,
    user_id: u64,
    username: &str,
    role: u8,
) -> Result<TokenPair, HttpResponse> {
    let now = Utc::now();

    let access = generate_token(
        TokenType::Access,
        user_id,
        username,
        role,
        &config.jwt_secret,
        config.access_token_ttl,
        now,
    );
    let refresh = generate_token(
        TokenType::Refresh,
        user_id,
        username,
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
        now,
    );
    let ((access_token, _), (refresh_token, refresh_claims)) = match (access, refresh) {
        (Ok(a), Ok(r)) => (a, r),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Failed to sign token");
            return Err(HttpResponse::InternalServerError().finish());
        }
    };

    let ttl = i64::try_from(config.refresh_token_ttl).unwrap_or(i64::MAX);
    let expires_at = now + Duration::seconds(ttl);

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");
    if let Err(e) = store
        .store_refresh_token(user_id, &refresh_claims.jti, expires_at)
        .await
    {
        error!(error = %e, "Failed to store refresh token");
        return Err(HttpResponse::InternalServerError().finish());
    }

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Username or password required"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(store, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return HttpResponse::BadRequest().body("Username or password required");
    }

    let db_user = match store.find_user_by_username(user.username.trim()).await {
        Ok(Some(u)) if u.is_active => u,
        Ok(_) => {
            info!("Invalid credentials: user not found or disabled");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Store error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    match issue_pair(
        store.get_ref(),
        &config,
        db_user.id,
        &db_user.username,
        db_user.role.id(),
    )
    .await
    {
        Ok(pair) => {
            info!(user_id = db_user.id, "Login successful");
            HttpResponse::Ok().json(pair)
        }
        Err(resp) => resp,
    }
}

/// Rotates a refresh token: the presented one is revoked, a new pair issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid, reused or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::Unauthorized().body("No token");
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::Unauthorized().finish(),
    };

    // Single conditional update: a token that loses a concurrent refresh race
    // finds it already revoked.
    match store.revoke_refresh_token(&claims.jti).await {
        Ok(true) => {}
        Ok(false) => {
            info!(user_id = claims.user_id, "Refresh token unknown or already used");
            return HttpResponse::Unauthorized().finish();
        }
        Err(e) => {
            error!(error = %e, "Failed to revoke refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    }

    // Disabled accounts and role changes take effect at the next refresh.
    let user = match store.find_user_by_username(&claims.sub).await {
        Ok(Some(u)) if u.is_active && u.id == claims.user_id => u,
        Ok(_) => {
            info!(user_id = claims.user_id, "Refresh refused: user missing or disabled");
            return HttpResponse::Unauthorized().finish();
        }
        Err(e) => {
            error!(error = %e, "Store error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    match issue_pair(
        store.get_ref(),
        &config,
        user.id,
        &user.username,
        user.role.id(),
    )
    .await
    {
        Ok(pair) => HttpResponse::Ok().json(pair),
        Err(resp) => resp,
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Refresh token revoked (idempotent)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    // only refresh tokens can logout
    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = store.revoke_refresh_token(&claims.jti).await {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

/// Operator account creation (admin only).
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = UserReq,
    responses(
        (status = 201, description = "User created", body = Object, example = json!({
            "message": "User registered successfully",
            "id": 4
        })),
        (status = 400, description = "Invalid username, password or role"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Username already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn create_user(
    auth: AuthUser,
    user: web::Json<UserReq>,
    store: web::Data<dyn Store>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let username = user.username.trim();
    if username.is_empty() || user.password.len() < 8 {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Username required and password must be at least 8 characters"
        })));
    }
    let Some(role) = Role::from_id(user.role_id) else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Unknown role_id"
        })));
    };

    let password_hash = hash_password(&user.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let result = store
        .create_user(NewUser {
            username: username.to_string(),
            password_hash,
            role,
        })
        .await;

    match result {
        Ok(id) => {
            info!(user_id = id, created_by = auth.user_id, "Operator account created");
            Ok(HttpResponse::Created().json(json!({
                "message": "User registered successfully",
                "id": id
            })))
        }
        Err(StoreError::Conflict) => Ok(HttpResponse::Conflict().json(json!({
            "error": "Username already exists"
        }))),
        Err(e) => {
            error!(error = %e, "Failed to create user");
            Err(actix_web::error::ErrorInternalServerError(
                "Internal Server Error",
            ))
        }
    }
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct SetUserActive {
    #[schema(example = false)]
    pub active: bool,
}

/// Enables or disables an operator account (admin only). A disabled account
/// can no longer log in or refresh its tokens.
#[utoipa::path(
    put,
    path = "/api/users/{id}/active",
    params(("id" = u64, Path, description = "User id")),
    request_body = SetUserActive,
    responses(
        (status = 204, description = "Account updated"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn set_user_active(
    auth: AuthUser,
    path: web::Path<u64>,
    body: web::Json<SetUserActive>,
    store: web::Data<dyn Store>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();

    match store.set_user_active(id, body.active).await {
        Ok(true) => {
            info!(
                user_id = id,
                active = body.active,
                updated_by = auth.user_id,
                "Operator activation changed"
            );
            Ok(HttpResponse::NoContent().finish())
        }
        Ok(false) => Ok(HttpResponse::NotFound().json(json!({
            "error": "User not found"
        }))),
        Err(e) => {
            error!(error = %e, "Failed to update user");
            Err(actix_web::error::ErrorInternalServerError(
                "Internal Server Error",
            ))
        }
    }
}
