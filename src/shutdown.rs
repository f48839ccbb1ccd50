use actix_web::dev::ServerHandle;
use sqlx::{Pool, Postgres};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A named background task that stops when the shutdown channel flips.
pub struct BackgroundTask {
    pub name: String,
    pub handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub fn new(name: impl Into<String>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

/// Handles graceful shutdown of the application
///
/// On SIGTERM or CTRL+C:
/// 1. Stop the HTTP server (no new requests)
/// 2. Signal export workers and the notification scheduler
/// 3. Wait for in-flight export jobs to reach a terminal state
/// 4. Close database connections, when running against PostgreSQL
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    tasks: Vec<BackgroundTask>,
    shutdown_tx: watch::Sender<bool>,
    pool: Option<Pool<Postgres>>,
}

impl ShutdownCoordinator {
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        tasks: Vec<BackgroundTask>,
        shutdown_tx: watch::Sender<bool>,
        pool: Option<Pool<Postgres>>,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            tasks,
            shutdown_tx,
            pool,
        }
    }

    /// Block until a shutdown signal arrives, then shut everything down.
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        #[cfg(unix)]
        let terminate = terminate.recv();

        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = ctrl_c => {
                result?;
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
        }

        self.shutdown().await
    }

    async fn shutdown(self) -> Result<(), std::io::Error> {
        info!("Stopping HTTP server (no longer accepting new requests)...");
        self.server_handle.stop(true).await;

        info!("Signaling background tasks to stop...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {:?}", e);
        }

        let total = self.tasks.len();
        info!("Waiting for {} background task(s) to finish...", total);
        for (i, task) in self.tasks.into_iter().enumerate() {
            match task.handle.await {
                Ok(()) => info!("{} stopped ({}/{})", task.name, i + 1, total),
                Err(e) => error!("{} failed to stop: {:?}", task.name, e),
            }
        }

        match self.server_task.await {
            Ok(Ok(())) => info!("HTTP server shut down successfully"),
            Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
            Err(e) => error!("HTTP server task panicked: {:?}", e),
        }

        if let Some(pool) = self.pool {
            info!("Closing database connection pool...");
            pool.close().await;
            info!("Database connections closed");
        }

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
