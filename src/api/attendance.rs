use crate::api::submission::read_submission;
use crate::attendance::AttendanceService;
use crate::auth::AuthUser;
use crate::config::Config;
use crate::model::attendance::AttendanceRecord;
use crate::store::AttendanceFilter;
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, ToSchema)]
pub struct TodayResponse {
    #[schema(example = true)]
    pub status: bool,
    /// Today's record, or null before the first check-in
    #[schema(nullable = true)]
    pub data: Option<AttendanceRecord>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceResponse {
    #[schema(example = true)]
    pub status: bool,
    #[schema(example = "Check-in successful")]
    pub message: String,
    pub data: AttendanceRecord,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    #[schema(example = true)]
    pub status: bool,
    pub data: Vec<AttendanceRecord>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

/// Check-in/check-out body. Also accepted as `multipart/form-data` with
/// `photo` sent as a file. Documentation only; bodies are read by
/// [`read_submission`].
#[derive(ToSchema)]
pub struct AttendanceForm {
    #[schema(example = "Office A", max_length = 255)]
    pub location: String,
    /// Base64 image, optionally as `data:image/<fmt>;base64,...`
    #[schema(example = "data:image/png;base64,iVBORw0KGgo=")]
    pub photo: String,
}

#[derive(Deserialize, IntoParams)]
pub struct AttendanceQuery {
    /// Filter by user ID
    pub user_id: Option<u64>,
    /// First day to include (inclusive)
    pub from: Option<NaiveDate>,
    /// Last day to include (inclusive)
    pub to: Option<NaiveDate>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>, // 1-based
    /// Pagination per page number
    pub per_page: Option<u64>, // items per page, at most 100
}

impl AttendanceQuery {
    fn to_filter(&self) -> AttendanceFilter {
        AttendanceFilter {
            user_id: self.user_id,
            from: self.from,
            to: self.to,
            page: self.page.unwrap_or(1).max(1),
            per_page: self.per_page.unwrap_or(10).clamp(1, 100),
        }
    }
}

/// Today's attendance record of the caller
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's record, or null", body = TodayResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(name = "http_today", skip_all, fields(user_id = auth.user_id))]
pub async fn today(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> actix_web::Result<impl Responder> {
    auth.require_employee()?;

    let record = service.today(auth.user_id).await?;

    Ok(HttpResponse::Ok().json(TodayResponse {
        status: true,
        data: record,
    }))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(
        content = AttendanceForm,
        description = "Location and photo evidence",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Checked in successfully", body = AttendanceResponse),
        (status = 400, description = "Already checked in today", body = Object, example = json!({
            "status": false,
            "message": "Already checked in today",
            "error": "already_checked_in"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Validation failed", body = Object, example = json!({
            "status": false,
            "message": "Validation failed",
            "error": { "photo": ["The photo field is required."] }
        })),
        (status = 500, description = "Photo could not be stored or store failure")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(name = "http_check_in", skip_all, fields(user_id = auth.user_id))]
pub async fn check_in(
    auth: AuthUser,
    req: HttpRequest,
    payload: web::Payload,
    service: web::Data<AttendanceService>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    auth.require_employee()?;

    let submission = read_submission(&req, payload, config.max_upload_bytes).await?;
    let record = service
        .check_in(auth.user_id, &submission.location, submission.photo)
        .await?;

    Ok(HttpResponse::Ok().json(AttendanceResponse {
        status: true,
        message: "Check-in successful".to_string(),
        data: record,
    }))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body(
        content = AttendanceForm,
        description = "Location and photo evidence",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Checked out successfully", body = AttendanceResponse),
        (status = 400, description = "Already checked out today", body = Object, example = json!({
            "status": false,
            "message": "Already checked out today",
            "error": "already_checked_out"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No check-in found for today", body = Object, example = json!({
            "status": false,
            "message": "No check-in found for today",
            "error": "not_checked_in"
        })),
        (status = 422, description = "Validation failed"),
        (status = 500, description = "Photo could not be stored or store failure")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(name = "http_check_out", skip_all, fields(user_id = auth.user_id))]
pub async fn check_out(
    auth: AuthUser,
    req: HttpRequest,
    payload: web::Payload,
    service: web::Data<AttendanceService>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    auth.require_employee()?;

    let submission = read_submission(&req, payload, config.max_upload_bytes).await?;
    let record = service
        .check_out(auth.user_id, &submission.location, submission.photo)
        .await?;

    Ok(HttpResponse::Ok().json(AttendanceResponse {
        status: true,
        message: "Check-out successful".to_string(),
        data: record,
    }))
}

/// for getting attendance records endpoint (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance list", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Invalid filter")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let filter = query.to_filter();
    let page = service.list(&filter).await?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        status: true,
        data: page.items,
        page: filter.page,
        per_page: filter.per_page,
        total: page.total,
    }))
}

/// Photo evidence by storage key (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance/photos/{key}",
    params(
        ("key" = String, Path, description = "Storage key of the photo")
    ),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Photo not found"),
        (status = 422, description = "Invalid key")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_photo(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let key = path.into_inner();
    let (bytes, format) = service.photo(&key).await?;

    Ok(HttpResponse::Ok()
        .content_type(format.mime_type())
        .body(bytes))
}
