use chrono::NaiveDateTime;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::db::store::StoreError;
use crate::domain::{
    Customer, ExportFilter, ExportJob, Professional, RequestView, Review, Service, ServiceRequest, User,
};
use crate::domain::review::Rating;

fn decode<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(StoreError::Decode)
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            role: decode(&row.role)?,
            username: row.username,
            email: row.email,
            is_active: row.is_active,
            created_at: row.created_at,
            password_hash: row.password_hash,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct CustomerRow {
    pub id: i32,
    pub user_id: i32,
    pub address: String,
    pub pin_code: String,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            user_id: row.user_id,
            address: row.address,
            pin_code: row.pin_code,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ProfessionalRow {
    pub id: i32,
    pub user_id: i32,
    pub service_id: i32,
    pub experience: i32,
    pub description: Option<String>,
    pub verification_status: String,
    pub documents: Option<String>,
}

impl TryFrom<ProfessionalRow> for Professional {
    type Error = StoreError;

    fn try_from(row: ProfessionalRow) -> Result<Self, Self::Error> {
        Ok(Professional {
            id: row.id,
            user_id: row.user_id,
            service_id: row.service_id,
            experience: row.experience,
            description: row.description,
            verification_status: decode(&row.verification_status)?,
            documents: row.documents,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ServiceRow {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub base_price: f64,
    pub time_required: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            name: row.name,
            description: row.description,
            base_price: row.base_price,
            time_required: row.time_required,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ServiceRequestRow {
    pub id: i32,
    pub service_id: i32,
    pub customer_id: i32,
    pub professional_id: Option<i32>,
    pub status: String,
    pub requested_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub remarks: Option<String>,
    pub version: i32,
}

impl TryFrom<ServiceRequestRow> for ServiceRequest {
    type Error = StoreError;

    fn try_from(row: ServiceRequestRow) -> Result<Self, Self::Error> {
        Ok(ServiceRequest {
            id: row.id,
            service_id: row.service_id,
            customer_id: row.customer_id,
            professional_id: row.professional_id,
            status: decode(&row.status)?,
            requested_at: row.requested_at,
            completed_at: row.completed_at,
            remarks: row.remarks,
            version: row.version,
        })
    }
}

/// Flat result of the request/service/customer/professional/review join.
#[derive(Debug, FromRow)]
pub struct RequestViewRow {
    pub id: i32,
    pub service_id: i32,
    pub service_name: String,
    pub service_price: f64,
    pub customer_id: i32,
    pub customer_name: String,
    pub customer_email: String,
    pub professional_id: Option<i32>,
    pub professional_name: Option<String>,
    pub professional_email: Option<String>,
    pub requested_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub status: String,
    pub remarks: Option<String>,
    pub rating: Option<i32>,
}

impl TryFrom<RequestViewRow> for RequestView {
    type Error = StoreError;

    fn try_from(row: RequestViewRow) -> Result<Self, Self::Error> {
        Ok(RequestView {
            id: row.id,
            service_id: row.service_id,
            service_name: row.service_name,
            service_price: row.service_price,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            professional_id: row.professional_id,
            professional_name: row.professional_name,
            professional_email: row.professional_email,
            requested_at: row.requested_at,
            completed_at: row.completed_at,
            status: decode(&row.status)?,
            remarks: row.remarks,
            rating: row.rating,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ReviewRow {
    pub id: i32,
    pub service_request_id: i32,
    pub rating: i32,
    pub comments: Option<String>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::new(i64::from(row.rating)).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Review {
            id: row.id,
            service_request_id: row.service_request_id,
            rating,
            comments: row.comments,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ExportJobRow {
    pub id: i32,
    pub owner_id: i32,
    pub format: String,
    pub filter_params: Json<ExportFilter>,
    pub deliver_to: Option<String>,
    pub status: String,
    pub file_name: Option<String>,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl TryFrom<ExportJobRow> for ExportJob {
    type Error = StoreError;

    fn try_from(row: ExportJobRow) -> Result<Self, Self::Error> {
        Ok(ExportJob {
            id: row.id,
            owner_id: row.owner_id,
            format: decode(&row.format)?,
            filter: row.filter_params.0,
            deliver_to: row.deliver_to,
            status: decode(&row.status)?,
            file_name: row.file_name,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}
