use sqlx::{MySqlPool, migrate::MigrateError};
use tracing::info;

pub async fn init_db(database_url: &str) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPool::connect(database_url).await?;
    info!("Connected to database");
    Ok(pool)
}

/// Applies `migrations/` in order; already-applied files are skipped.
pub async fn run_migrations(pool: &MySqlPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}
