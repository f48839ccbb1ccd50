use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, QueryBuilder};
use tracing::debug;

use crate::db::models::{
    CustomerRow, ExportJobRow, ProfessionalRow, RequestViewRow, ReviewRow, ServiceRequestRow, ServiceRow, UserRow,
};
use crate::db::store::{Store, StoreError};
use crate::domain::{
    Customer, ExportJob, NewCustomer, NewExportJob, NewProfessional, NewReview, NewServiceRequest, NewUser,
    Professional, RequestQuery, RequestView, Review, Service, ServiceInput, ServiceRequest, User,
    VerificationStatus,
};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_active, created_at";
const CUSTOMER_COLUMNS: &str = "id, user_id, address, pin_code";
const PROFESSIONAL_COLUMNS: &str =
    "id, user_id, service_id, experience, description, verification_status, documents";
const SERVICE_COLUMNS: &str = "id, name, description, base_price, time_required, is_active, created_at";
const REQUEST_COLUMNS: &str =
    "id, service_id, customer_id, professional_id, status, requested_at, completed_at, remarks, version";
const REVIEW_COLUMNS: &str = "id, service_request_id, rating, comments, created_at";
const EXPORT_JOB_COLUMNS: &str = "id, owner_id, format, filter_params, deliver_to, status, file_name, \
     error_message, created_at, started_at, completed_at";

const REQUEST_VIEW_SELECT: &str = r#"
    SELECT sr.id, sr.service_id, s.name AS service_name, s.base_price AS service_price,
           sr.customer_id, cu.username AS customer_name, cu.email AS customer_email,
           sr.professional_id, pu.username AS professional_name, pu.email AS professional_email,
           sr.requested_at, sr.completed_at, sr.status, sr.remarks, r.rating
    FROM service_requests sr
    JOIN services s ON s.id = sr.service_id
    JOIN customers c ON c.id = sr.customer_id
    JOIN users cu ON cu.id = c.user_id
    LEFT JOIN professionals p ON p.id = sr.professional_id
    LEFT JOIN users pu ON pu.id = p.user_id
    LEFT JOIN reviews r ON r.service_request_id = sr.id
    WHERE TRUE"#;

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn insert_user(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user: &NewUser,
        role: &str,
        now: NaiveDateTime,
    ) -> Result<UserRow, StoreError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(role)
            .bind(now)
            .fetch_one(&mut **tx)
            .await?;
        Ok(row)
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE role <> 'admin' ORDER BY id", USER_COLUMNS);
        let rows = sqlx::query_as::<_, UserRow>(&sql).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn set_user_active(&self, id: i32, active: bool) -> Result<Option<User>, StoreError> {
        let sql = format!("UPDATE users SET is_active = $2 WHERE id = $1 RETURNING {}", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn create_admin_if_absent(&self, admin: NewUser, now: NaiveDateTime) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, role, created_at) \
             SELECT $1, $2, $3, 'admin', $4 \
             WHERE NOT EXISTS (SELECT 1 FROM users WHERE role = 'admin') \
             RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(&admin.username)
            .bind(&admin.email)
            .bind(&admin.password_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn create_customer(&self, customer: NewCustomer, now: NaiveDateTime) -> Result<(User, Customer), StoreError> {
        let mut tx = self.pool.begin().await?;
        let user = Self::insert_user(&mut tx, &customer.user, "customer", now).await?;

        let sql = format!(
            "INSERT INTO customers (user_id, address, pin_code) VALUES ($1, $2, $3) RETURNING {}",
            CUSTOMER_COLUMNS
        );
        let row = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(user.id)
            .bind(&customer.address)
            .bind(&customer.pin_code)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("Customer created: user_id={}, customer_id={}", user.id, row.id);
        Ok((User::try_from(user)?, Customer::from(row)))
    }

    async fn create_professional(
        &self,
        professional: NewProfessional,
        now: NaiveDateTime,
    ) -> Result<(User, Professional), StoreError> {
        let mut tx = self.pool.begin().await?;
        let user = Self::insert_user(&mut tx, &professional.user, "professional", now).await?;

        let sql = format!(
            "INSERT INTO professionals (user_id, service_id, experience, description, documents) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            PROFESSIONAL_COLUMNS
        );
        let row = sqlx::query_as::<_, ProfessionalRow>(&sql)
            .bind(user.id)
            .bind(professional.service_id)
            .bind(professional.experience)
            .bind(&professional.description)
            .bind(&professional.documents)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("Professional created: user_id={}, professional_id={}", user.id, row.id);
        Ok((User::try_from(user)?, Professional::try_from(row)?))
    }

    async fn find_customer_by_user(&self, user_id: i32) -> Result<Option<Customer>, StoreError> {
        let sql = format!("SELECT {} FROM customers WHERE user_id = $1", CUSTOMER_COLUMNS);
        let row = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Customer::from))
    }

    async fn find_professional_by_user(&self, user_id: i32) -> Result<Option<Professional>, StoreError> {
        let sql = format!("SELECT {} FROM professionals WHERE user_id = $1", PROFESSIONAL_COLUMNS);
        sqlx::query_as::<_, ProfessionalRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Professional::try_from)
            .transpose()
    }

    async fn find_professional(&self, id: i32) -> Result<Option<Professional>, StoreError> {
        let sql = format!("SELECT {} FROM professionals WHERE id = $1", PROFESSIONAL_COLUMNS);
        sqlx::query_as::<_, ProfessionalRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Professional::try_from)
            .transpose()
    }

    async fn list_professionals(&self) -> Result<Vec<Professional>, StoreError> {
        let sql = format!("SELECT {} FROM professionals ORDER BY id", PROFESSIONAL_COLUMNS);
        let rows = sqlx::query_as::<_, ProfessionalRow>(&sql).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn set_verification(
        &self,
        id: i32,
        status: VerificationStatus,
    ) -> Result<Option<Professional>, StoreError> {
        let sql = format!(
            "UPDATE professionals SET verification_status = $2 WHERE id = $1 RETURNING {}",
            PROFESSIONAL_COLUMNS
        );
        sqlx::query_as::<_, ProfessionalRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Professional::try_from)
            .transpose()
    }

    async fn update_customer(&self, id: i32, address: &str, pin_code: &str) -> Result<Option<Customer>, StoreError> {
        let sql = format!(
            "UPDATE customers SET address = $2, pin_code = $3 WHERE id = $1 RETURNING {}",
            CUSTOMER_COLUMNS
        );
        let row = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(id)
            .bind(address)
            .bind(pin_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Customer::from))
    }

    async fn update_professional(
        &self,
        id: i32,
        experience: i32,
        description: Option<&str>,
    ) -> Result<Option<Professional>, StoreError> {
        let sql = format!(
            "UPDATE professionals SET experience = $2, description = $3 WHERE id = $1 RETURNING {}",
            PROFESSIONAL_COLUMNS
        );
        sqlx::query_as::<_, ProfessionalRow>(&sql)
            .bind(id)
            .bind(experience)
            .bind(description)
            .fetch_optional(&self.pool)
            .await?
            .map(Professional::try_from)
            .transpose()
    }

    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        let sql = format!("SELECT {} FROM services ORDER BY id", SERVICE_COLUMNS);
        let rows = sqlx::query_as::<_, ServiceRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Service::from).collect())
    }

    async fn find_service(&self, id: i32) -> Result<Option<Service>, StoreError> {
        let sql = format!("SELECT {} FROM services WHERE id = $1", SERVICE_COLUMNS);
        let row = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Service::from))
    }

    async fn create_service(&self, input: &ServiceInput, now: NaiveDateTime) -> Result<Service, StoreError> {
        let sql = format!(
            "INSERT INTO services (name, description, base_price, time_required, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            SERVICE_COLUMNS
        );
        let row = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.base_price)
            .bind(input.time_required)
            .bind(input.is_active)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(Service::from(row))
    }

    async fn update_service(&self, id: i32, input: &ServiceInput) -> Result<Option<Service>, StoreError> {
        let sql = format!(
            "UPDATE services SET name = $2, description = $3, base_price = $4, time_required = $5, \
             is_active = $6 WHERE id = $1 RETURNING {}",
            SERVICE_COLUMNS
        );
        let row = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.base_price)
            .bind(input.time_required)
            .bind(input.is_active)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Service::from))
    }

    async fn delete_service(&self, id: i32) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let references = sqlx::query_scalar::<_, i64>(
            "SELECT (SELECT COUNT(*) FROM professionals WHERE service_id = $1) \
                  + (SELECT COUNT(*) FROM service_requests WHERE service_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if references > 0 {
            debug!("Service {} still has {} references", id, references);
            return Err(StoreError::InUse(format!("service {}", id)));
        }

        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_request(&self, request: NewServiceRequest) -> Result<ServiceRequest, StoreError> {
        let sql = format!(
            "INSERT INTO service_requests (service_id, customer_id, remarks, status, requested_at) \
             VALUES ($1, $2, $3, 'requested', $4) RETURNING {}",
            REQUEST_COLUMNS
        );
        let row = sqlx::query_as::<_, ServiceRequestRow>(&sql)
            .bind(request.service_id)
            .bind(request.customer_id)
            .bind(&request.remarks)
            .bind(request.requested_at)
            .fetch_one(&self.pool)
            .await?;
        debug!("Service request created with id={}", row.id);
        ServiceRequest::try_from(row)
    }

    async fn find_request(&self, id: i32) -> Result<Option<ServiceRequest>, StoreError> {
        let sql = format!("SELECT {} FROM service_requests WHERE id = $1", REQUEST_COLUMNS);
        sqlx::query_as::<_, ServiceRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ServiceRequest::try_from)
            .transpose()
    }

    async fn save_request(&self, next: &ServiceRequest) -> Result<ServiceRequest, StoreError> {
        let sql = format!(
            "UPDATE service_requests \
             SET professional_id = $3, status = $4, completed_at = $5, remarks = $6, version = version + 1 \
             WHERE id = $1 AND version = $2 RETURNING {}",
            REQUEST_COLUMNS
        );
        let row = sqlx::query_as::<_, ServiceRequestRow>(&sql)
            .bind(next.id)
            .bind(next.version)
            .bind(next.professional_id)
            .bind(next.status.as_str())
            .bind(next.completed_at)
            .bind(&next.remarks)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => ServiceRequest::try_from(row),
            None => Err(StoreError::Stale(next.id)),
        }
    }

    async fn delete_request(&self, id: i32, version: i32) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM service_requests WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Stale(id));
        }
        Ok(())
    }

    async fn query_requests(&self, query: &RequestQuery) -> Result<Vec<RequestView>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(REQUEST_VIEW_SELECT);

        if let Some(id) = query.id {
            qb.push(" AND sr.id = ").push_bind(id);
        }
        if let Some(id) = query.customer_id {
            qb.push(" AND sr.customer_id = ").push_bind(id);
        }
        if let Some(id) = query.professional_id {
            qb.push(" AND sr.professional_id = ").push_bind(id);
        }
        if let Some(id) = query.service_id {
            qb.push(" AND sr.service_id = ").push_bind(id);
        }
        if !query.statuses.is_empty() {
            let statuses: Vec<String> = query.statuses.iter().map(|s| s.as_str().to_string()).collect();
            qb.push(" AND sr.status = ANY(").push_bind(statuses).push(")");
        }
        if query.unassigned_only {
            qb.push(" AND sr.professional_id IS NULL");
        }
        if let Some(from) = query.requested_from {
            qb.push(" AND sr.requested_at >= ").push_bind(from);
        }
        if let Some(before) = query.requested_before {
            qb.push(" AND sr.requested_at < ").push_bind(before);
        }
        qb.push(" ORDER BY sr.id");

        let rows = qb.build_query_as::<RequestViewRow>().fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn create_review(&self, review: NewReview) -> Result<Review, StoreError> {
        let sql = format!(
            "INSERT INTO reviews (service_request_id, rating, comments, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            REVIEW_COLUMNS
        );
        let row = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(review.service_request_id)
            .bind(i32::from(review.rating.value()))
            .bind(&review.comments)
            .bind(review.created_at)
            .fetch_one(&self.pool)
            .await?;
        Review::try_from(row)
    }

    async fn find_review(&self, service_request_id: i32) -> Result<Option<Review>, StoreError> {
        let sql = format!("SELECT {} FROM reviews WHERE service_request_id = $1", REVIEW_COLUMNS);
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(service_request_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Review::try_from)
            .transpose()
    }

    async fn create_export_job(&self, job: NewExportJob) -> Result<ExportJob, StoreError> {
        let sql = format!(
            "INSERT INTO export_jobs (owner_id, format, filter_params, deliver_to, status, created_at) \
             VALUES ($1, $2, $3, $4, 'pending', $5) RETURNING {}",
            EXPORT_JOB_COLUMNS
        );
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(job.owner_id)
            .bind(job.format.as_str())
            .bind(Json(&job.filter))
            .bind(&job.deliver_to)
            .bind(job.created_at)
            .fetch_one(&self.pool)
            .await?;
        debug!("Export job created with id={}", row.id);
        ExportJob::try_from(row)
    }

    async fn find_export_job(&self, id: i32) -> Result<Option<ExportJob>, StoreError> {
        let sql = format!("SELECT {} FROM export_jobs WHERE id = $1", EXPORT_JOB_COLUMNS);
        sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ExportJob::try_from)
            .transpose()
    }

    async fn find_export_job_by_file(&self, file_name: &str) -> Result<Option<ExportJob>, StoreError> {
        let sql = format!("SELECT {} FROM export_jobs WHERE file_name = $1", EXPORT_JOB_COLUMNS);
        sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(file_name)
            .fetch_optional(&self.pool)
            .await?
            .map(ExportJob::try_from)
            .transpose()
    }

    async fn list_export_jobs(&self, owner_id: i32) -> Result<Vec<ExportJob>, StoreError> {
        let sql = format!(
            "SELECT {} FROM export_jobs WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            EXPORT_JOB_COLUMNS
        );
        let rows = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn claim_next_export_job(&self, now: NaiveDateTime) -> Result<Option<ExportJob>, StoreError> {
        let sql = format!(
            "UPDATE export_jobs SET status = 'processing', started_at = $1 \
             WHERE id = ( \
                 SELECT id FROM export_jobs WHERE status = 'pending' \
                 ORDER BY created_at, id LIMIT 1 FOR UPDATE SKIP LOCKED \
             ) RETURNING {}",
            EXPORT_JOB_COLUMNS
        );
        sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .map(ExportJob::try_from)
            .transpose()
    }

    async fn complete_export_job(&self, id: i32, file_name: &str, now: NaiveDateTime) -> Result<ExportJob, StoreError> {
        let sql = format!(
            "UPDATE export_jobs SET status = 'completed', file_name = $2, completed_at = $3 \
             WHERE id = $1 AND status = 'processing' RETURNING {}",
            EXPORT_JOB_COLUMNS
        );
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(id)
            .bind(file_name)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => ExportJob::try_from(row),
            None => Err(StoreError::Stale(id)),
        }
    }

    async fn fail_export_job(&self, id: i32, message: &str, now: NaiveDateTime) -> Result<ExportJob, StoreError> {
        let sql = format!(
            "UPDATE export_jobs SET status = 'failed', error_message = $2, completed_at = $3 \
             WHERE id = $1 AND status = 'processing' RETURNING {}",
            EXPORT_JOB_COLUMNS
        );
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(id)
            .bind(message)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => ExportJob::try_from(row),
            None => Err(StoreError::Stale(id)),
        }
    }

    async fn fail_stale_export_jobs(
        &self,
        started_before: NaiveDateTime,
        message: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<ExportJob>, StoreError> {
        let sql = format!(
            "UPDATE export_jobs SET status = 'failed', error_message = $2, completed_at = $3 \
             WHERE status = 'processing' AND (started_at IS NULL OR started_at < $1) RETURNING {}",
            EXPORT_JOB_COLUMNS
        );
        sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(started_before)
            .bind(message)
            .bind(now)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ExportJob::try_from)
            .collect()
    }
}
