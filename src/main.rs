use actix_multipart::form::MultipartFormConfig;
use actix_web::{cookie::Key, web, App, HttpServer};
use chrono::Utc;
use clap::Parser;
use sqlx::{Pool, Postgres};
use std::io;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod api;
mod config;
mod db;
mod domain;
mod error;
mod notify;
mod report;
mod service;
mod shutdown;
mod worker;

#[cfg(test)]
mod tests;

use crate::api::{api_config, health::health_config, session_middleware, validation};
use crate::config::{Cli, Command, Config};
use crate::db::{InMemoryStore, PgStore, Store};
use crate::notify::{run_scheduler, ConsoleMailer, Mailer, SmtpMailer};
use crate::service::{AppContext, ContextSettings};
use crate::shutdown::{BackgroundTask, ShutdownCoordinator};
use crate::worker::{ExportProcessor, ExportWorker};

fn fatal(context: &str, err: impl std::fmt::Display) -> io::Error {
    io::Error::other(format!("{}: {}", context, err))
}

/// Console plus daily rotating info/warn/error files under `log_dir`.
fn init_logging(log_dir: &std::path::Path) -> io::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let info_file = tracing_appender::rolling::daily(log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(log_dir, "error.log");

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .init();
    Ok(())
}

/// PostgreSQL (migrated) or the in-memory store for `--ephemeral`.
async fn open_store(config: &Config, ephemeral: bool) -> io::Result<(Arc<dyn Store>, Option<Pool<Postgres>>)> {
    let Some(database_url) = config.database_url.as_deref().filter(|_| !ephemeral) else {
        warn!("Running with the in-memory store; all data is lost on exit");
        return Ok((Arc::new(InMemoryStore::new()), None));
    };

    let pool = db::connection::get_connection(database_url, config.max_db_connections)
        .await
        .map_err(|e| fatal("Failed to connect to database", e))?;
    info!("Database connection pool established");

    db::migrations::run_migrations(&pool)
        .await
        .map_err(|e| fatal("Failed to run database migrations", e))?;

    Ok((Arc::new(PgStore::new(pool.clone())), Some(pool)))
}

fn build_mailer(config: &Config) -> io::Result<Arc<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => {
            info!("Sending mail through SMTP relay {}:{}", smtp.host, smtp.port);
            let mailer = SmtpMailer::new(smtp, &config.mail_from).map_err(|e| fatal("Invalid SMTP settings", e))?;
            Ok(Arc::new(mailer))
        }
        None => {
            info!("SMTP_HOST not set, emails will be logged to the console");
            Ok(Arc::new(ConsoleMailer))
        }
    }
}

fn session_key(config: &Config) -> io::Result<Key> {
    match &config.session_key {
        Some(key) => Key::try_from(key.as_bytes()).map_err(|e| fatal("SESSION_KEY must be at least 64 bytes", e)),
        None => {
            warn!("SESSION_KEY not set, sessions will not survive a restart");
            Ok(Key::generate())
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env(cli.ephemeral).map_err(|e| fatal("Failed to load configuration", e))?;
    init_logging(&config.log_dir)?;

    let (store, pool) = open_store(&config, cli.ephemeral).await?;
    let mailer = build_mailer(&config)?;
    let ctx = web::Data::new(AppContext::new(
        store.clone(),
        mailer.clone(),
        ContextSettings {
            jwt_secret: config.jwt_secret.clone(),
            export_dir: config.export_dir.clone(),
            upload_dir: config.upload_dir.clone(),
        },
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            ctx.accounts
                .bootstrap_admin(&config.admin)
                .await
                .map_err(|e| fatal("Failed to bootstrap admin", e))?;
            info!("Migrations applied");
            return Ok(());
        }
        Command::Remind => {
            let summary = ctx
                .notifier
                .send_reminders()
                .await
                .map_err(|e| fatal("Reminder sweep failed", e))?;
            info!("Reminders sent: {} ok, {} failed", summary.sent, summary.failed);
            return Ok(());
        }
        Command::MonthlyReport => {
            let summary = ctx
                .notifier
                .send_monthly_reports(Utc::now().naive_utc())
                .await
                .map_err(|e| fatal("Monthly report sweep failed", e))?;
            info!("Monthly reports sent: {} ok, {} failed", summary.sent, summary.failed);
            return Ok(());
        }
        Command::Serve => {}
    }

    ctx.accounts
        .bootstrap_admin(&config.admin)
        .await
        .map_err(|e| fatal("Failed to bootstrap admin", e))?;

    info!("Starting household-services");
    info!("Configuration loaded successfully:");
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Max concurrent export jobs: {}", config.max_concurrent_jobs);
    info!("  - Number of export workers: {}", config.num_workers);
    info!("  - Export job timeout: {}s", config.export_job_timeout_secs);
    info!("  - Reminder interval: {}s", config.reminder_interval_secs);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut tasks = Vec::new();

    // Permits are shared, so at most max_concurrent_jobs exports render at once.
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
    let processor = Arc::new(ExportProcessor::new(store.clone(), mailer, config.export_dir.clone()));
    for worker_id in 1..=config.num_workers {
        let worker = ExportWorker::new(
            store.clone(),
            processor.clone(),
            ctx.export_wake.clone(),
            Duration::from_secs(config.worker_poll_interval_secs),
            chrono::Duration::seconds(i64::from(u32::try_from(config.export_job_timeout_secs).unwrap_or(u32::MAX))),
        );
        let worker_semaphore = semaphore.clone();
        let worker_shutdown_rx = shutdown_rx.clone();
        let handle = tokio::spawn(async move { worker.run(worker_id, worker_semaphore, worker_shutdown_rx).await });
        tasks.push(BackgroundTask::new(format!("Export worker {}", worker_id), handle));
        info!("Spawned export worker {}", worker_id);
    }

    let scheduler = tokio::spawn(run_scheduler(
        ctx.notifier.clone(),
        Duration::from_secs(config.reminder_interval_secs),
        shutdown_rx.clone(),
    ));
    tasks.push(BackgroundTask::new("Notification scheduler", scheduler));

    let key = session_key(&config)?;
    let cookie_secure = config.cookie_secure;
    let max_payload_size = config.max_payload_size;
    let server_ctx = ctx.clone();

    let server = HttpServer::new(move || {
        let payload_config = web::PayloadConfig::default().limit(max_payload_size);
        let multipart_config = MultipartFormConfig::default().total_limit(max_payload_size);

        App::new()
            .wrap(session_middleware(key.clone(), cookie_secure))
            .app_data(server_ctx.clone())
            .app_data(payload_config)
            .app_data(multipart_config)
            .app_data(validation::json_config())
            .configure(health_config)
            .configure(api_config)
    })
    .bind(config.bind_addr.as_str())?
    .run();

    info!("Server starting on http://{}", config.bind_addr);

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    ShutdownCoordinator::new(server_handle, server_task, tasks, shutdown_tx, pool)
        .wait_for_shutdown()
        .await
}
