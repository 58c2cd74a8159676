use crate::error::AttendanceError;
use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// The caller, as resolved by [`auth_middleware`](crate::auth::middleware::auth_middleware).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub role: Role,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = req
            .extensions()
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AttendanceError::Unauthorized("Missing token").into());
        ready(user)
    }
}

impl AuthUser {
    pub fn require_hr_or_admin(&self) -> Result<(), AttendanceError> {
        match self.role {
            Role::Admin | Role::Hr => Ok(()),
            _ => Err(AttendanceError::Forbidden),
        }
    }

    /// Attendance is recorded only by users holding the employee role.
    pub fn require_employee(&self) -> Result<(), AttendanceError> {
        match self.role {
            Role::Employee => Ok(()),
            _ => Err(AttendanceError::Forbidden),
        }
    }
}
