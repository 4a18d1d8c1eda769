use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use attendance::{
    attendance::{AttendanceService, IdentityResolver},
    auth::password::hash_password,
    clock::{Clock, SystemClock},
    config::{Config, StoreBackend},
    db,
    docs::ApiDoc,
    model::{role::Role, user::NewUser},
    report::ReportService,
    routes,
    store::{MemoryStore, MySqlStore, Store, StoreError},
};

/// Creates the configured admin unless a user with that name already exists.
async fn bootstrap_admin(store: &dyn Store, username: &str, password: &str) -> anyhow::Result<()> {
    if store.find_user_by_username(username).await?.is_some() {
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("hashing admin password: {e}"))?;
    match store
        .create_user(NewUser {
            username: username.to_string(),
            password_hash,
            role: Role::Admin,
        })
        .await
    {
        Ok(id) => info!(user_id = id, %username, "Bootstrap admin created"),
        // another instance created it first
        Err(StoreError::Conflict) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "attendance.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(addr = %config.server_addr, backend = ?config.store_backend, "Server starting...");

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::MySql => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let pool = db::init_db(url).await.context("connecting to database")?;
            if config.run_migrations {
                db::run_migrations(&pool).await.context("running migrations")?;
            }
            Arc::new(MySqlStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some((username, password)) = &config.bootstrap_admin {
        bootstrap_admin(store.as_ref(), username, password).await?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let resolver = IdentityResolver::new(
        store.clone(),
        config.identity_cache_capacity,
        config.identity_cache_ttl,
    );
    let attendance_service = Data::new(AttendanceService::new(
        store.clone(),
        resolver,
        config.lateness.clone(),
        clock.clone(),
    ));
    let reports = Data::new(ReportService::new(
        store.clone(),
        config.lateness.clone(),
        clock,
        config.report_max_range_days,
    ));
    let store_data: Data<dyn Store> = Data::from(store);

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config.clone());

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard {_:.*} to match JS/CSS files
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(store_data.clone())
            .app_data(config_data.clone())
            .app_data(attendance_service.clone())
            .app_data(reports.clone())
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("binding {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
