use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AttendanceError;
use crate::model::role::Role;
use actix_web::http::header::{AUTHORIZATION, HeaderMap};
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use tracing::debug;

/// Resolves the bearer token into an [`AuthUser`] stored in request extensions.
/// Rejections use the same JSON envelope as every other API error.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    match authenticate(req.headers(), &config.jwt_secret) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.call(req).await
        }
        Err(err) => {
            debug!(path = %req.path(), reason = %err, "Unauthenticated request");
            let resp = err.error_response();
            Ok(req.into_response(resp))
        }
    }
}

fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthUser, AttendanceError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AttendanceError::Unauthorized("Missing Authorization header"))?;

    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AttendanceError::Unauthorized(
            "Authorization header must start with Bearer",
        ))?;

    let claims = verify_token(token, secret).map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        AttendanceError::Unauthorized("Invalid or expired token")
    })?;

    let role = Role::from_id(claims.role).ok_or(AttendanceError::Unauthorized("Invalid role"))?;

    Ok(AuthUser {
        user_id: claims.user_id,
        role,
    })
}
