//! Enqueueing, polling and downloading export jobs.
//!
//! Rendering happens in [`crate::worker::ExportWorker`]; this side only writes
//! the pending record and wakes the workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::info;

use crate::db::Store;
use crate::domain::{
    ExportFilter, ExportFormat, ExportJob, ExportJobStatus, FilterCriterion, Identity, NewExportJob, Role,
};
use crate::error::AppError;
use crate::service::requests::approved_professional_of;

pub const DOWNLOAD_PATH: &str = "/api/reports/download";

/// What a client sees when polling a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobDescriptor {
    pub id: i32,
    pub job_type: &'static str,
    pub format: ExportFormat,
    pub status: ExportJobStatus,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub filter_params: ExportFilter,
    pub deliver_to: Option<String>,
    pub file_url: Option<String>,
    pub error_message: Option<String>,
}

impl From<ExportJob> for JobDescriptor {
    fn from(job: ExportJob) -> Self {
        JobDescriptor {
            id: job.id,
            job_type: job.format.job_type(),
            format: job.format,
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            file_url: job
                .file_name
                .as_ref()
                .map(|name| format!("{}/{}", DOWNLOAD_PATH, name)),
            filter_params: job.filter,
            deliver_to: job.deliver_to,
            error_message: job.error_message,
        }
    }
}

/// A finished export ready to be streamed back.
#[derive(Debug)]
pub struct Download {
    pub path: PathBuf,
    pub file_name: String,
    pub format: ExportFormat,
}

pub struct ExportService {
    store: Arc<dyn Store>,
    export_dir: PathBuf,
    wake: Arc<Notify>,
}

impl ExportService {
    pub fn new(store: Arc<dyn Store>, export_dir: PathBuf, wake: Arc<Notify>) -> Self {
        Self {
            store,
            export_dir,
            wake,
        }
    }

    /// Record a pending job and return immediately.
    ///
    /// Admins may export anything. Professionals only ever get their own
    /// requests, whatever professional they asked for.
    pub async fn enqueue(
        &self,
        identity: &Identity,
        format: ExportFormat,
        criteria: Vec<FilterCriterion>,
        deliver_to: Option<String>,
    ) -> Result<ExportJob, AppError> {
        let mut filter = ExportFilter::new(criteria)?;
        match identity.role {
            Role::Admin => {}
            Role::Professional => {
                let professional = approved_professional_of(self.store.as_ref(), identity).await?;
                filter.restrict_to_professional(professional.id);
            }
            Role::Customer => {
                return Err(AppError::Forbidden(
                    "Customers cannot export service requests".to_string(),
                ))
            }
        }

        let job = self
            .store
            .create_export_job(NewExportJob {
                owner_id: identity.user_id,
                format,
                filter,
                deliver_to,
                created_at: Utc::now().naive_utc(),
            })
            .await?;
        self.wake.notify_one();

        info!(
            job_id = job.id,
            owner_id = job.owner_id,
            job_type = job.format.job_type(),
            "Export job queued"
        );
        Ok(job)
    }

    /// Unknown and foreign jobs look the same to the caller.
    pub async fn status(&self, identity: &Identity, job_id: i32) -> Result<ExportJob, AppError> {
        self.store
            .find_export_job(job_id)
            .await?
            .filter(|job| job.owner_id == identity.user_id)
            .ok_or_else(|| AppError::NotFound(format!("Export job {} not found", job_id)))
    }

    pub async fn list(&self, identity: &Identity) -> Result<Vec<ExportJob>, AppError> {
        Ok(self.store.list_export_jobs(identity.user_id).await?)
    }

    /// Locate the artifact of a completed job owned by the caller.
    ///
    /// A job that claims the file while the file is gone is a server-side
    /// [`AppError::MissingFile`], not an unknown job.
    pub async fn download(&self, identity: &Identity, file_name: &str) -> Result<Download, AppError> {
        if !is_plain_file_name(file_name) {
            return Err(AppError::Validation("Invalid file name".to_string()));
        }

        let job = self
            .store
            .find_export_job_by_file(file_name)
            .await?
            .filter(|job| job.owner_id == identity.user_id && job.status == ExportJobStatus::Completed)
            .ok_or_else(|| AppError::NotFound(format!("Export {} not found", file_name)))?;

        let path = self.export_dir.join(file_name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AppError::MissingFile(format!(
                "Export file for job {} is missing",
                job.id
            )));
        }

        Ok(Download {
            path,
            file_name: file_name.to_string(),
            format: job.format,
        })
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
        && !name.contains(['/', '\\'])
}
