use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::{Value, json};
use tracing::debug;

fn reject(req: ServiceRequest, body: Value) -> ServiceResponse<BoxBody> {
    debug!(path = %req.path(), reason = %body["error"], "Request rejected by auth");
    req.into_response(HttpResponse::Unauthorized().json(body))
}

/// Resolves the bearer header into a caller, or the 401 body explaining why not.
fn authenticate(req: &ServiceRequest, secret: &str) -> Result<AuthUser, Value> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| json!({"error": "Missing Authorization header"}))?
        .to_str()
        .map_err(|_| json!({"error": "Invalid Authorization header encoding"}))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| json!({"error": "Authorization header must start with Bearer"}))?;

    let claims = verify_token(token, secret)
        .map_err(|e| json!({"error": "Invalid or expired token", "details": e}))?;
    if claims.token_type != TokenType::Access {
        return Err(json!({"error": "Refresh tokens cannot access the API"}));
    }

    let role = Role::from_id(claims.role).ok_or_else(|| json!({"error": "Invalid role"}))?;

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
    })
}

/// Validates the bearer access token and stores the caller as [`AuthUser`].
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    match authenticate(&req, &config.jwt_secret) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.call(req).await
        }
        Err(body) => Ok(reject(req, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_token;
    use actix_web::test::TestRequest;
    use chrono::Utc;

    const SECRET: &str = "middleware-secret";

    fn with_bearer(token: &str) -> ServiceRequest {
        TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_srv_request()
    }

    #[test]
    fn access_token_resolves_the_caller() {
        let (token, _) =
            generate_token(TokenType::Access, 7, "gate-1", Role::Scanner.id(), SECRET, 60, Utc::now())
                .unwrap();

        let user = authenticate(&with_bearer(&token), SECRET).unwrap();
        assert_eq!(user.user_id, 7);
        assert_eq!(user.username, "gate-1");
        assert_eq!(user.role, Role::Scanner);
    }

    #[test]
    fn each_rejection_names_its_reason() {
        let missing = authenticate(&TestRequest::default().to_srv_request(), SECRET).unwrap_err();
        assert_eq!(missing["error"], "Missing Authorization header");

        let basic = TestRequest::default()
            .insert_header(("Authorization", "Basic Zm9vOmJhcg=="))
            .to_srv_request();
        let basic = authenticate(&basic, SECRET).unwrap_err();
        assert_eq!(basic["error"], "Authorization header must start with Bearer");

        let (refresh, _) =
            generate_token(TokenType::Refresh, 7, "gate-1", Role::Admin.id(), SECRET, 60, Utc::now())
                .unwrap();
        let refresh = authenticate(&with_bearer(&refresh), SECRET).unwrap_err();
        assert_eq!(refresh["error"], "Refresh tokens cannot access the API");

        let forged = authenticate(&with_bearer(&signed_with_other_secret()), SECRET).unwrap_err();
        assert_eq!(forged["error"], "Invalid or expired token");
    }

    fn signed_with_other_secret() -> String {
        generate_token(TokenType::Access, 7, "gate-1", Role::Admin.id(), "other", 60, Utc::now())
            .unwrap()
            .0
    }
}
