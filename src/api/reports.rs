use actix_web::{
    get,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    post,
    web::{scope, Data, Path, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;
use serde::{Deserialize, Serialize};
use tracing::error;
use validator::Validate;

use crate::domain::{DateRange, ExportFormat, FilterCriterion, Identity, RequestStatus};
use crate::error::AppError;
use crate::service::exports::JobDescriptor;
use crate::service::AppContext;

/// Flat export request. Every filter field is optional; absent means "any".
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ExportBody {
    #[serde(default)]
    pub format: ExportFormat,
    pub professional_id: Option<i32>,
    pub service_id: Option<i32>,
    pub status: Option<RequestStatus>,
    pub date_range: Option<DateRange>,
    #[validate(email(message = "Delivery email is not valid"))]
    pub email: Option<String>,
}

impl ExportBody {
    fn criteria(&self) -> Vec<FilterCriterion> {
        let mut criteria = Vec::new();
        if let Some(id) = self.professional_id {
            criteria.push(FilterCriterion::Professional(id));
        }
        if let Some(id) = self.service_id {
            criteria.push(FilterCriterion::Service(id));
        }
        if let Some(status) = self.status {
            criteria.push(FilterCriterion::Status(status));
        }
        if let Some(range) = self.date_range {
            criteria.push(FilterCriterion::DateRange(range));
        }
        criteria
    }
}

#[derive(Serialize)]
struct ExportQueuedResponse {
    message: String,
    job_id: i32,
    status_url: String,
}

#[post("/export-jobs")]
async fn create_export_job(
    ctx: Data<AppContext>,
    identity: Identity,
    body: Json<ExportBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let criteria = body.criteria();
    let job = ctx
        .exports
        .enqueue(&identity, body.format, criteria, body.email)
        .await?;

    Ok(HttpResponse::Accepted().json(ExportQueuedResponse {
        message: "Export job created successfully".to_string(),
        job_id: job.id,
        status_url: format!("/api/reports/export-status/{}", job.id),
    }))
}

#[get("/export-jobs")]
async fn list_export_jobs(ctx: Data<AppContext>, identity: Identity) -> Result<HttpResponse, AppError> {
    let jobs: Vec<JobDescriptor> = ctx
        .exports
        .list(&identity)
        .await?
        .into_iter()
        .map(JobDescriptor::from)
        .collect();
    Ok(HttpResponse::Ok().json(jobs))
}

#[get("/export-status/{job_id}")]
async fn export_status(ctx: Data<AppContext>, identity: Identity, job_id: Path<i32>) -> Result<HttpResponse, AppError> {
    let job = ctx.exports.status(&identity, job_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(JobDescriptor::from(job)))
}

#[get("/download/{file_name}")]
async fn download(ctx: Data<AppContext>, identity: Identity, file_name: Path<String>) -> Result<HttpResponse, AppError> {
    let download = ctx.exports.download(&identity, &file_name).await?;
    let content = tokio::fs::read(&download.path).await.map_err(|e| {
        error!("Failed to read export {}: {}", download.path.display(), e);
        AppError::MissingFile(format!("Export file {} could not be read", download.file_name))
    })?;

    Ok(HttpResponse::Ok()
        .content_type(download.format.content_type())
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(download.file_name)],
        })
        .body(content))
}

pub fn reports_config(config: &mut ServiceConfig) {
    config.service(
        scope("/reports")
            .service(create_export_job)
            .service(list_export_jobs)
            .service(export_status)
            .service(download),
    );
}
