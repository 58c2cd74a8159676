use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

use attendance::attendance::AttendanceService;
use attendance::clock::{Clock, SystemClock};
use attendance::config::Config;
use attendance::db::init_db;
use attendance::docs::ApiDoc;
use attendance::photo::{FsPhotoStore, PhotoIngestor, PhotoStore};
use attendance::routes;
use attendance::store::MySqlAttendanceStore;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "attendance.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url, config.db_max_connections).await?;

    let photos = Arc::new(FsPhotoStore::new(&config.photo_dir));
    photos
        .ensure_ready()
        .await
        .context("Failed to prepare photo directory")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = Data::new(AttendanceService::new(
        Arc::new(MySqlAttendanceStore::new(pool)),
        PhotoIngestor::new(photos, clock.clone()),
        clock,
    ));

    let limiter = Arc::new(routes::build_limiter(config.rate_protected_per_min)?);
    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    info!(addr = %server_addr, "Listening");

    HttpServer::new(move || {
        let config = config_data.clone();
        let limiter = limiter.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config.clone())
            .app_data(service.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config, limiter))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
