use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::db::{Store, StoreError};
use crate::domain::ExportJob;
use crate::notify::{Email, EmailAttachment, Mailer};
use crate::report;

const EXPORT_SUBJECT: &str = "Your Exported Service Requests";
const EXPORT_BODY: &str = "Please find attached the exported service requests data you requested.";

/// Turns one claimed job into a file on disk and a terminal job record.
pub struct ExportProcessor {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    export_dir: PathBuf,
}

impl ExportProcessor {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, export_dir: PathBuf) -> Self {
        Self {
            store,
            mailer,
            export_dir,
        }
    }

    /// Process a job already moved to `processing`.
    ///
    /// Any rendering or write failure ends in `failed` with the message
    /// captured on the record. Mail delivery happens after completion and
    /// cannot undo it.
    pub async fn process(&self, job: ExportJob, now: NaiveDateTime) -> Result<ExportJob, StoreError> {
        info!(job_id = job.id, job_type = job.format.job_type(), "Processing export job");

        let (file_name, content) = match self.write_export(&job, now).await {
            Ok(written) => written,
            Err(message) => {
                error!(job_id = job.id, "Export job failed: {}", message);
                return self.store.fail_export_job(job.id, &message, Utc::now().naive_utc()).await;
            }
        };

        self.finish(&job, file_name, content).await
    }

    /// Record a written export as completed and deliver it.
    ///
    /// When the completion itself cannot be recorded the job is failed
    /// instead, so it never stays in `processing`.
    pub(crate) async fn finish(&self, job: &ExportJob, file_name: String, content: Vec<u8>) -> Result<ExportJob, StoreError> {
        let done = match self
            .store
            .complete_export_job(job.id, &file_name, Utc::now().naive_utc())
            .await
        {
            Ok(done) => done,
            Err(e) => {
                error!(job_id = job.id, file = %file_name, "Failed to record export completion: {}", e);
                let message = format!("Failed to record export result: {}", e);
                return self.store.fail_export_job(job.id, &message, Utc::now().naive_utc()).await;
            }
        };
        info!(job_id = done.id, file = %file_name, "Export job completed");

        if let Some(to) = done.deliver_to.clone() {
            let email = Email::text(to.clone(), EXPORT_SUBJECT, EXPORT_BODY).with_attachment(EmailAttachment {
                file_name,
                content_type: done.format.content_type().to_string(),
                content,
            });
            match self.mailer.send(email).await {
                Ok(()) => info!(job_id = done.id, to = %to, "Export emailed"),
                Err(e) => warn!(job_id = done.id, to = %to, "Export email failed: {}", e),
            }
        }
        Ok(done)
    }

    /// Fail a job whose processing task died before recording an outcome.
    pub async fn abandon(&self, job_id: i32, message: &str) {
        match self.store.find_export_job(job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {}
            Ok(_) => match self.store.fail_export_job(job_id, message, Utc::now().naive_utc()).await {
                Ok(_) => warn!(job_id, "Export job failed: {}", message),
                Err(e) => error!(job_id, "Failed to fail abandoned export job: {}", e),
            },
            Err(e) => error!(job_id, "Failed to load abandoned export job: {}", e),
        }
    }

    async fn write_export(&self, job: &ExportJob, now: NaiveDateTime) -> Result<(String, Vec<u8>), String> {
        let mut rows = self
            .store
            .query_requests(&job.filter.to_query(now))
            .await
            .map_err(|e| format!("Failed to load service requests: {}", e))?;
        rows.sort_by_key(|row| row.id);

        let format = job.format;
        let content = tokio::task::spawn_blocking(move || report::render(format, &rows, now))
            .await
            .map_err(|e| format!("Renderer task failed: {}", e))?
            .map_err(|e| format!("Failed to render export: {}", e))?;

        let file_name = report::file_name(format, now);
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|e| format!("Failed to create export directory: {}", e))?;
        tokio::fs::write(self.export_dir.join(&file_name), &content)
            .await
            .map_err(|e| format!("Failed to write export file: {}", e))?;

        Ok((file_name, content))
    }
}

const STALE_MESSAGE: &str = "Export job did not finish; its worker stopped before recording a result";

/// Background loop that claims pending export jobs
pub struct ExportWorker {
    store: Arc<dyn Store>,
    processor: Arc<ExportProcessor>,
    wake: Arc<Notify>,
    poll_interval: Duration,
    /// Claims older than this are treated as lost.
    stale_after: chrono::Duration,
}

impl ExportWorker {
    pub fn new(
        store: Arc<dyn Store>,
        processor: Arc<ExportProcessor>,
        wake: Arc<Notify>,
        poll_interval: Duration,
        stale_after: chrono::Duration,
    ) -> Self {
        Self {
            store,
            processor,
            wake,
            poll_interval,
            stale_after,
        }
    }

    /// Fail jobs left in `processing` by a worker that died mid-job.
    async fn fail_stale_jobs(&self, worker_id: usize) {
        let now = Utc::now().naive_utc();
        match self
            .store
            .fail_stale_export_jobs(now - self.stale_after, STALE_MESSAGE, now)
            .await
        {
            Ok(failed) => {
                for job in failed {
                    warn!(job_id = job.id, started_at = ?job.started_at, "Worker {} failed stale export job", worker_id);
                }
            }
            Err(e) => error!("Worker {} could not sweep stale export jobs: {}", worker_id, e),
        }
    }

    /// Run until shutdown is signalled, then wait for in-flight jobs.
    ///
    /// # Concurrency Model
    /// - A semaphore permit is taken before claiming, so a claimed job never
    ///   waits for capacity
    /// - Each claimed job is processed in its own task holding that permit
    /// - Permits are shared by every worker, bounding renders process-wide
    /// - Idle workers sleep for the poll interval or until a job is queued
    /// - Claims older than `stale_after` are failed on startup and whenever
    ///   the queue is empty
    pub async fn run(&self, worker_id: usize, semaphore: Arc<Semaphore>, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Export worker {} started", worker_id);
        self.fail_stale_jobs(worker_id).await;
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("Worker {} failed to acquire semaphore: {:?}", worker_id, e);
                        break;
                    }
                },
                _ = shutdown_rx.changed() => break,
            };

            match self.store.claim_next_export_job(Utc::now().naive_utc()).await {
                Ok(Some(job)) => {
                    info!("Worker {} claimed export job {}", worker_id, job.id);
                    let processor = self.processor.clone();
                    in_flight.push(tokio::spawn(async move {
                        let job_id = job.id;
                        let task = tokio::spawn({
                            let processor = processor.clone();
                            async move { processor.process(job, Utc::now().naive_utc()).await }
                        });
                        match task.await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => error!("Failed to record outcome of export job {}: {}", job_id, e),
                            Err(e) => {
                                error!("Export job {} task aborted: {:?}", job_id, e);
                                processor.abandon(job_id, "Export task aborted before finishing").await;
                            }
                        }
                        drop(permit);
                    }));
                }
                Ok(None) => {
                    drop(permit);
                    self.fail_stale_jobs(worker_id).await;
                    tokio::select! {
                        _ = sleep(self.poll_interval) => {}
                        _ = self.wake.notified() => {}
                        _ = shutdown_rx.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!("Worker {} encountered database error: {}", worker_id, e);
                    sleep(Duration::from_secs(1)).await;
                }
            }

            in_flight.retain(|handle| !handle.is_finished());
        }

        info!(
            "Worker {} received shutdown signal, waiting for {} in-flight job(s)",
            worker_id,
            in_flight.len()
        );
        for handle in in_flight {
            if let Err(e) = handle.await {
                error!("Export task in worker {} panicked: {:?}", worker_id, e);
            }
        }
        info!("Export worker {} stopped", worker_id);
    }
}
