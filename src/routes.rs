use crate::{
    api::attendance,
    auth::middleware::auth_middleware,
    config::Config,
    error::{AttendanceError, ValidationErrors},
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub type Limiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-IP limiter; build once and share across workers.
pub fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit: {requests_per_min}/min"))?;
    Ok(Governor::new(&cfg))
}

/// Mounts the protected API behind the per-IP limiter and bearer auth.
pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiter: Arc<Limiter>) {
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiter) // rate limiting
            .configure(attendance_routes),
    );
}

/// `/attendance` routes, relative to the API prefix.
pub fn attendance_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            .app_data(query_config())
            // /attendance
            .service(web::resource("").route(web::get().to(attendance::list_attendance)))
            .service(web::resource("/today").route(web::get().to(attendance::today)))
            .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
            .service(web::resource("/check-out").route(web::post().to(attendance::check_out)))
            // /attendance/photos/{key}
            .service(web::resource("/photos/{key}").route(web::get().to(attendance::get_photo))),
    );
}

/// Malformed filters answer like every other validation failure.
fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let mut errors = ValidationErrors::new();
        errors.add("query", err.to_string());
        AttendanceError::Validation(errors).into()
    })
}
