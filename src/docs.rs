use crate::api::attendance::{
    AttendanceForm, AttendanceListResponse, AttendanceResponse, TodayResponse,
};
use crate::model::attendance::AttendanceRecord;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance API",
        version = "1.0.0",
        description = r#"
## Employee Attendance

Daily **check-in** and **check-out** with a location note and photo evidence.

### 🔹 Lifecycle
- One record per employee per calendar day (server local date)
- `check-in` opens the day, `check-out` closes it; nothing moves after that

### 📷 Photo evidence
- `application/json`: `photo` as base64, optionally a `data:image/<fmt>;base64,` URL
- `multipart/form-data`: `photo` as a file part
- JPEG, PNG, GIF and WEBP are detected from the image bytes

### 🔐 Security
All endpoints require a **JWT Bearer** access token.
Check-in/out is limited to the employee role; the list and photo endpoints to **Admin** or **HR**.

### 📦 Response Format
`{ "status": true|false, "message": ..., "data"|"error": ... }`
"#,
    ),
    paths(
        crate::api::attendance::today,
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::list_attendance,
        crate::api::attendance::get_photo
    ),
    components(
        schemas(
            AttendanceRecord,
            AttendanceForm,
            TodayResponse,
            AttendanceResponse,
            AttendanceListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Attendance check-in/check-out APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
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
    fn openapi_lists_attendance_paths_and_bearer_auth() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        for path in [
            "/api/attendance/today",
            "/api/attendance/check-in",
            "/api/attendance/check-out",
            "/api/attendance",
            "/api/attendance/photos/{key}",
        ] {
            assert!(json["paths"].get(path).is_some(), "missing {path}");
        }
        assert!(json["components"]["securitySchemes"].get("bearer_auth").is_some());
    }
}
