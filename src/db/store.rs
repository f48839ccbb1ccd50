use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::{
    Customer, ExportJob, NewCustomer, NewExportJob, NewProfessional, NewReview, NewServiceRequest, NewUser,
    Professional, RequestQuery, RequestView, Review, Service, ServiceInput, ServiceRequest, User,
    VerificationStatus,
};
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A compare-and-set lost to a concurrent writer.
    #[error("record {0} was modified concurrently")]
    Stale(i32),

    #[error("unique constraint violated: {0}")]
    Duplicate(String),

    /// Delete refused because other rows still reference the record.
    #[error("{0} is still referenced")]
    InUse(String),

    #[error("stored value could not be decoded: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Duplicate(db.constraint().unwrap_or("unknown").to_string());
            }
            if db.is_foreign_key_violation() {
                return StoreError::InUse(db.constraint().unwrap_or("unknown").to_string());
            }
        }
        StoreError::Database(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Stale(id) => AppError::Conflict(format!(
                "Record {} was modified by another request, reload and retry",
                id
            )),
            StoreError::Duplicate(what) => AppError::Conflict(format!("Duplicate value ({})", what)),
            StoreError::InUse(what) => AppError::Conflict(format!("Cannot delete: {} is still in use", what)),
            StoreError::Decode(msg) => AppError::Internal(msg),
        }
    }
}

/// Persistence seam shared by the request path and the background workers.
///
/// Every method is one transaction. Lifecycle writes go through
/// [`Store::save_request`], which only succeeds when the stored version still
/// equals the caller's.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    // Identity

    async fn find_user(&self, id: i32) -> Result<Option<User>, StoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Every non-admin user.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn set_user_active(&self, id: i32, active: bool) -> Result<Option<User>, StoreError>;
    /// Returns the created admin, or `None` when one already exists.
    async fn create_admin_if_absent(&self, admin: NewUser, now: NaiveDateTime) -> Result<Option<User>, StoreError>;
    async fn create_customer(&self, customer: NewCustomer, now: NaiveDateTime) -> Result<(User, Customer), StoreError>;
    async fn create_professional(
        &self,
        professional: NewProfessional,
        now: NaiveDateTime,
    ) -> Result<(User, Professional), StoreError>;
    async fn find_customer_by_user(&self, user_id: i32) -> Result<Option<Customer>, StoreError>;
    async fn find_professional_by_user(&self, user_id: i32) -> Result<Option<Professional>, StoreError>;
    async fn find_professional(&self, id: i32) -> Result<Option<Professional>, StoreError>;
    async fn list_professionals(&self) -> Result<Vec<Professional>, StoreError>;
    async fn set_verification(
        &self,
        id: i32,
        status: VerificationStatus,
    ) -> Result<Option<Professional>, StoreError>;
    async fn update_customer(&self, id: i32, address: &str, pin_code: &str) -> Result<Option<Customer>, StoreError>;
    /// Self-service fields only; service and verification stay untouched.
    async fn update_professional(
        &self,
        id: i32,
        experience: i32,
        description: Option<&str>,
    ) -> Result<Option<Professional>, StoreError>;

    // Catalog

    async fn list_services(&self) -> Result<Vec<Service>, StoreError>;
    async fn find_service(&self, id: i32) -> Result<Option<Service>, StoreError>;
    async fn create_service(&self, input: &ServiceInput, now: NaiveDateTime) -> Result<Service, StoreError>;
    async fn update_service(&self, id: i32, input: &ServiceInput) -> Result<Option<Service>, StoreError>;
    /// `Ok(false)` when absent, [`StoreError::InUse`] when referenced.
    async fn delete_service(&self, id: i32) -> Result<bool, StoreError>;

    // Service requests

    async fn create_request(&self, request: NewServiceRequest) -> Result<ServiceRequest, StoreError>;
    async fn find_request(&self, id: i32) -> Result<Option<ServiceRequest>, StoreError>;
    /// Persist `next` if the stored version still equals `next.version`.
    /// Returns the stored row with its version bumped.
    async fn save_request(&self, next: &ServiceRequest) -> Result<ServiceRequest, StoreError>;
    async fn delete_request(&self, id: i32, version: i32) -> Result<(), StoreError>;
    async fn query_requests(&self, query: &RequestQuery) -> Result<Vec<RequestView>, StoreError>;

    // Reviews

    /// [`StoreError::Duplicate`] when the request already has one.
    async fn create_review(&self, review: NewReview) -> Result<Review, StoreError>;
    async fn find_review(&self, service_request_id: i32) -> Result<Option<Review>, StoreError>;

    // Export jobs

    async fn create_export_job(&self, job: NewExportJob) -> Result<ExportJob, StoreError>;
    async fn find_export_job(&self, id: i32) -> Result<Option<ExportJob>, StoreError>;
    async fn find_export_job_by_file(&self, file_name: &str) -> Result<Option<ExportJob>, StoreError>;
    async fn list_export_jobs(&self, owner_id: i32) -> Result<Vec<ExportJob>, StoreError>;
    /// Atomically move the oldest pending job to processing.
    async fn claim_next_export_job(&self, now: NaiveDateTime) -> Result<Option<ExportJob>, StoreError>;
    /// Only from processing; otherwise [`StoreError::Stale`].
    async fn complete_export_job(&self, id: i32, file_name: &str, now: NaiveDateTime) -> Result<ExportJob, StoreError>;
    /// Only from processing; otherwise [`StoreError::Stale`].
    async fn fail_export_job(&self, id: i32, message: &str, now: NaiveDateTime) -> Result<ExportJob, StoreError>;
    /// Fail every job still processing that was claimed before `started_before`.
    async fn fail_stale_export_jobs(
        &self,
        started_before: NaiveDateTime,
        message: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<ExportJob>, StoreError>;
}
