use sqlx::{Pool, Postgres};
use tracing::info;

/// Apply the embedded schema migrations. Already applied ones are skipped.
pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed successfully");
    Ok(())
}
