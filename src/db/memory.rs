//! Process-local [`Store`] used by `--ephemeral` runs and the test suite.
//!
//! Mirrors the constraints the PostgreSQL schema enforces: unique usernames
//! and emails, one review per request, restricted service deletes, version
//! checks on request writes and forward-only export job states.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;

use crate::db::store::{Store, StoreError};
use crate::domain::{
    Customer, ExportJob, ExportJobStatus, NewCustomer, NewExportJob, NewProfessional, NewReview, NewServiceRequest,
    NewUser, Professional, RequestQuery, RequestStatus, RequestView, Review, Role, Service, ServiceInput,
    ServiceRequest, User, VerificationStatus,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    customers: BTreeMap<i32, Customer>,
    professionals: BTreeMap<i32, Professional>,
    services: BTreeMap<i32, Service>,
    requests: BTreeMap<i32, ServiceRequest>,
    reviews: BTreeMap<i32, Review>,
    export_jobs: BTreeMap<i32, ExportJob>,
    sequences: Sequences,
}

#[derive(Default)]
struct Sequences {
    user: i32,
    customer: i32,
    professional: i32,
    service: i32,
    request: i32,
    review: i32,
    export_job: i32,
}

fn next(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

impl Tables {
    fn check_unique_user(&self, user: &NewUser) -> Result<(), StoreError> {
        if self.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate("users_username_key".to_string()));
        }
        if self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("users_email_key".to_string()));
        }
        Ok(())
    }

    fn insert_user(&mut self, user: NewUser, role: Role, now: NaiveDateTime) -> Result<User, StoreError> {
        self.check_unique_user(&user)?;
        let row = User {
            id: next(&mut self.sequences.user),
            username: user.username,
            email: user.email,
            role,
            is_active: true,
            created_at: now,
            password_hash: user.password_hash,
        };
        self.users.insert(row.id, row.clone());
        Ok(row)
    }

    fn check_service(&self, service_id: i32) -> Result<(), StoreError> {
        if self.services.contains_key(&service_id) {
            Ok(())
        } else {
            Err(StoreError::InUse(format!("service {} does not exist", service_id)))
        }
    }

    fn view(&self, request: &ServiceRequest) -> Result<RequestView, StoreError> {
        let broken = |what: &str| StoreError::Decode(format!("request {} references missing {}", request.id, what));

        let service = self.services.get(&request.service_id).ok_or_else(|| broken("service"))?;
        let customer = self
            .customers
            .get(&request.customer_id)
            .and_then(|c| self.users.get(&c.user_id))
            .ok_or_else(|| broken("customer"))?;
        let professional = request
            .professional_id
            .and_then(|id| self.professionals.get(&id))
            .and_then(|p| self.users.get(&p.user_id));
        let rating = self
            .reviews
            .values()
            .find(|r| r.service_request_id == request.id)
            .map(|r| i32::from(r.rating.value()));

        Ok(RequestView {
            id: request.id,
            service_id: service.id,
            service_name: service.name.clone(),
            service_price: service.base_price,
            customer_id: request.customer_id,
            customer_name: customer.username.clone(),
            customer_email: customer.email.clone(),
            professional_id: request.professional_id,
            professional_name: professional.map(|u| u.username.clone()),
            professional_email: professional.map(|u| u.email.clone()),
            requested_at: request.requested_at,
            completed_at: request.completed_at,
            status: request.status,
            remarks: request.remarks.clone(),
            rating,
        })
    }

    fn finish_export_job(
        &mut self,
        id: i32,
        status: ExportJobStatus,
        now: NaiveDateTime,
    ) -> Result<&mut ExportJob, StoreError> {
        match self.export_jobs.get_mut(&id) {
            Some(job) if job.status.can_advance_to(status) => {
                job.status = status;
                job.completed_at = Some(now);
                Ok(job)
            }
            _ => Err(StoreError::Stale(id)),
        }
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().filter(|u| u.role != Role::Admin).cloned().collect())
    }

    async fn set_user_active(&self, id: i32, active: bool) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.is_active = active;
            user.clone()
        }))
    }

    async fn create_admin_if_absent(&self, admin: NewUser, now: NaiveDateTime) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.role == Role::Admin) {
            return Ok(None);
        }
        tables.insert_user(admin, Role::Admin, now).map(Some)
    }

    async fn create_customer(&self, customer: NewCustomer, now: NaiveDateTime) -> Result<(User, Customer), StoreError> {
        let mut tables = self.tables.lock().await;
        let user = tables.insert_user(customer.user, Role::Customer, now)?;
        let row = Customer {
            id: next(&mut tables.sequences.customer),
            user_id: user.id,
            address: customer.address,
            pin_code: customer.pin_code,
        };
        tables.customers.insert(row.id, row.clone());
        Ok((user, row))
    }

    async fn create_professional(
        &self,
        professional: NewProfessional,
        now: NaiveDateTime,
    ) -> Result<(User, Professional), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check_service(professional.service_id)?;
        let user = tables.insert_user(professional.user, Role::Professional, now)?;
        let row = Professional {
            id: next(&mut tables.sequences.professional),
            user_id: user.id,
            service_id: professional.service_id,
            experience: professional.experience,
            description: professional.description,
            verification_status: VerificationStatus::Pending,
            documents: professional.documents,
        };
        tables.professionals.insert(row.id, row.clone());
        Ok((user, row))
    }

    async fn find_customer_by_user(&self, user_id: i32) -> Result<Option<Customer>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.customers.values().find(|c| c.user_id == user_id).cloned())
    }

    async fn find_professional_by_user(&self, user_id: i32) -> Result<Option<Professional>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.professionals.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn find_professional(&self, id: i32) -> Result<Option<Professional>, StoreError> {
        Ok(self.tables.lock().await.professionals.get(&id).cloned())
    }

    async fn list_professionals(&self) -> Result<Vec<Professional>, StoreError> {
        Ok(self.tables.lock().await.professionals.values().cloned().collect())
    }

    async fn set_verification(
        &self,
        id: i32,
        status: VerificationStatus,
    ) -> Result<Option<Professional>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.professionals.get_mut(&id).map(|p| {
            p.verification_status = status;
            p.clone()
        }))
    }

    async fn update_customer(&self, id: i32, address: &str, pin_code: &str) -> Result<Option<Customer>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.customers.get_mut(&id).map(|c| {
            c.address = address.to_string();
            c.pin_code = pin_code.to_string();
            c.clone()
        }))
    }

    async fn update_professional(
        &self,
        id: i32,
        experience: i32,
        description: Option<&str>,
    ) -> Result<Option<Professional>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.professionals.get_mut(&id).map(|p| {
            p.experience = experience;
            p.description = description.map(String::from);
            p.clone()
        }))
    }

    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        Ok(self.tables.lock().await.services.values().cloned().collect())
    }

    async fn find_service(&self, id: i32) -> Result<Option<Service>, StoreError> {
        Ok(self.tables.lock().await.services.get(&id).cloned())
    }

    async fn create_service(&self, input: &ServiceInput, now: NaiveDateTime) -> Result<Service, StoreError> {
        let mut tables = self.tables.lock().await;
        let service = Service {
            id: next(&mut tables.sequences.service),
            name: input.name.clone(),
            description: input.description.clone(),
            base_price: input.base_price,
            time_required: input.time_required,
            is_active: input.is_active,
            created_at: now,
        };
        tables.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn update_service(&self, id: i32, input: &ServiceInput) -> Result<Option<Service>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.services.get_mut(&id).map(|service| {
            service.name = input.name.clone();
            service.description = input.description.clone();
            service.base_price = input.base_price;
            service.time_required = input.time_required;
            service.is_active = input.is_active;
            service.clone()
        }))
    }

    async fn delete_service(&self, id: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let referenced = tables.professionals.values().any(|p| p.service_id == id)
            || tables.requests.values().any(|r| r.service_id == id);
        if referenced {
            return Err(StoreError::InUse(format!("service {}", id)));
        }
        Ok(tables.services.remove(&id).is_some())
    }

    async fn create_request(&self, request: NewServiceRequest) -> Result<ServiceRequest, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check_service(request.service_id)?;
        let row = ServiceRequest {
            id: next(&mut tables.sequences.request),
            service_id: request.service_id,
            customer_id: request.customer_id,
            professional_id: None,
            status: RequestStatus::Requested,
            requested_at: request.requested_at,
            completed_at: None,
            remarks: request.remarks,
            version: 0,
        };
        tables.requests.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_request(&self, id: i32) -> Result<Option<ServiceRequest>, StoreError> {
        Ok(self.tables.lock().await.requests.get(&id).cloned())
    }

    async fn save_request(&self, next: &ServiceRequest) -> Result<ServiceRequest, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.requests.get_mut(&next.id) {
            Some(stored) if stored.version == next.version => {
                *stored = ServiceRequest {
                    version: next.version + 1,
                    ..next.clone()
                };
                Ok(stored.clone())
            }
            _ => Err(StoreError::Stale(next.id)),
        }
    }

    async fn delete_request(&self, id: i32, version: i32) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.requests.get(&id) {
            Some(stored) if stored.version == version => {
                tables.requests.remove(&id);
                tables.reviews.retain(|_, r| r.service_request_id != id);
                Ok(())
            }
            _ => Err(StoreError::Stale(id)),
        }
    }

    async fn query_requests(&self, query: &RequestQuery) -> Result<Vec<RequestView>, StoreError> {
        let tables = self.tables.lock().await;
        let mut views = Vec::new();
        for request in tables.requests.values() {
            let view = tables.view(request)?;
            if query.matches(&view) {
                views.push(view);
            }
        }
        Ok(views)
    }

    async fn create_review(&self, review: NewReview) -> Result<Review, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables
            .reviews
            .values()
            .any(|r| r.service_request_id == review.service_request_id)
        {
            return Err(StoreError::Duplicate("reviews_service_request_id_key".to_string()));
        }
        let row = Review {
            id: next(&mut tables.sequences.review),
            service_request_id: review.service_request_id,
            rating: review.rating,
            comments: review.comments,
            created_at: review.created_at,
        };
        tables.reviews.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_review(&self, service_request_id: i32) -> Result<Option<Review>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reviews
            .values()
            .find(|r| r.service_request_id == service_request_id)
            .cloned())
    }

    async fn create_export_job(&self, job: NewExportJob) -> Result<ExportJob, StoreError> {
        let mut tables = self.tables.lock().await;
        let row = ExportJob {
            id: next(&mut tables.sequences.export_job),
            owner_id: job.owner_id,
            format: job.format,
            filter: job.filter,
            deliver_to: job.deliver_to,
            status: ExportJobStatus::Pending,
            file_name: None,
            error_message: None,
            created_at: job.created_at,
            started_at: None,
            completed_at: None,
        };
        tables.export_jobs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_export_job(&self, id: i32) -> Result<Option<ExportJob>, StoreError> {
        Ok(self.tables.lock().await.export_jobs.get(&id).cloned())
    }

    async fn find_export_job_by_file(&self, file_name: &str) -> Result<Option<ExportJob>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .export_jobs
            .values()
            .find(|j| j.file_name.as_deref() == Some(file_name))
            .cloned())
    }

    async fn list_export_jobs(&self, owner_id: i32) -> Result<Vec<ExportJob>, StoreError> {
        let tables = self.tables.lock().await;
        let mut jobs: Vec<ExportJob> = tables
            .export_jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(jobs)
    }

    async fn claim_next_export_job(&self, now: NaiveDateTime) -> Result<Option<ExportJob>, StoreError> {
        let mut tables = self.tables.lock().await;
        let oldest = tables
            .export_jobs
            .values()
            .filter(|j| j.status == ExportJobStatus::Pending)
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        Ok(oldest.and_then(|id| tables.export_jobs.get_mut(&id)).map(|job| {
            job.status = ExportJobStatus::Processing;
            job.started_at = Some(now);
            job.clone()
        }))
    }

    async fn complete_export_job(&self, id: i32, file_name: &str, now: NaiveDateTime) -> Result<ExportJob, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables
            .export_jobs
            .values()
            .any(|j| j.id != id && j.file_name.as_deref() == Some(file_name))
        {
            return Err(StoreError::Duplicate("export_jobs_file_name_key".to_string()));
        }
        let job = tables.finish_export_job(id, ExportJobStatus::Completed, now)?;
        job.file_name = Some(file_name.to_string());
        Ok(job.clone())
    }

    async fn fail_export_job(&self, id: i32, message: &str, now: NaiveDateTime) -> Result<ExportJob, StoreError> {
        let mut tables = self.tables.lock().await;
        let job = tables.finish_export_job(id, ExportJobStatus::Failed, now)?;
        job.error_message = Some(message.to_string());
        Ok(job.clone())
    }

    async fn fail_stale_export_jobs(
        &self,
        started_before: NaiveDateTime,
        message: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<ExportJob>, StoreError> {
        let mut tables = self.tables.lock().await;
        let mut failed = Vec::new();
        for job in tables.export_jobs.values_mut() {
            let stale = job.status == ExportJobStatus::Processing
                && job.started_at.map_or(true, |started| started < started_before);
            if stale {
                job.status = ExportJobStatus::Failed;
                job.error_message = Some(message.to_string());
                job.completed_at = Some(now);
                failed.push(job.clone());
            }
        }
        Ok(failed)
    }
}
