//! Per-role summary counters over service requests.

use std::sync::Arc;

use serde::Serialize;

use crate::db::Store;
use crate::domain::{Identity, RequestQuery, RequestStatus, RequestView, Role, VerificationStatus};
use crate::error::AppError;
use crate::service::requests::{approved_professional_of, customer_of};

/// Number of requests in each status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub requested: usize,
    pub assigned: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub completed: usize,
    pub closed: usize,
}

impl StatusCounts {
    fn tally(views: &[RequestView]) -> Self {
        let mut counts = StatusCounts::default();
        for view in views {
            let slot = match view.status {
                RequestStatus::Requested => &mut counts.requested,
                RequestStatus::Assigned => &mut counts.assigned,
                RequestStatus::Accepted => &mut counts.accepted,
                RequestStatus::Rejected => &mut counts.rejected,
                RequestStatus::Completed => &mut counts.completed,
                RequestStatus::Closed => &mut counts.closed,
            };
            *slot += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminSummary {
    pub total_services: usize,
    pub total_professionals: usize,
    pub total_customers: usize,
    pub total_service_requests: usize,
    pub pending_approvals: usize,
    pub service_request_stats: StatusCounts,
    pub average_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSummary {
    pub total_requests: usize,
    #[serde(flatten)]
    pub by_status: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessionalSummary {
    pub total_requests: usize,
    #[serde(flatten)]
    pub by_status: StatusCounts,
    /// Unbound `requested` work in the professional's trade.
    pub available_requests: usize,
    pub average_rating: f64,
}

/// The caller's dashboard, shaped by role.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum DashboardSummary {
    Admin(AdminSummary),
    Customer(CustomerSummary),
    Professional(ProfessionalSummary),
}

/// Compact counters for the professional home screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessionalStats {
    /// Assigned or accepted.
    pub active: usize,
    pub completed: usize,
    pub available: usize,
    pub rating: f64,
}

/// Mean over reviewed requests; 0 when nothing was reviewed.
fn average_rating(views: &[RequestView]) -> f64 {
    let ratings: Vec<i32> = views.iter().filter_map(|v| v.rating).collect();
    if ratings.is_empty() {
        0.0
    } else {
        f64::from(ratings.iter().sum::<i32>()) / ratings.len() as f64
    }
}

pub struct DashboardService {
    store: Arc<dyn Store>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn summary(&self, identity: &Identity) -> Result<DashboardSummary, AppError> {
        match identity.role {
            Role::Admin => self.admin_summary().await.map(DashboardSummary::Admin),
            Role::Customer => {
                let customer = customer_of(self.store.as_ref(), identity).await?;
                let views = self
                    .store
                    .query_requests(&RequestQuery {
                        customer_id: Some(customer.id),
                        ..Default::default()
                    })
                    .await?;
                Ok(DashboardSummary::Customer(CustomerSummary {
                    total_requests: views.len(),
                    by_status: StatusCounts::tally(&views),
                }))
            }
            Role::Professional => {
                let (bound, available) = self.professional_views(identity).await?;
                Ok(DashboardSummary::Professional(ProfessionalSummary {
                    total_requests: bound.len(),
                    by_status: StatusCounts::tally(&bound),
                    available_requests: available,
                    average_rating: average_rating(&bound),
                }))
            }
        }
    }

    pub async fn professional_stats(&self, identity: &Identity) -> Result<ProfessionalStats, AppError> {
        identity.require_role(Role::Professional)?;
        let (bound, available) = self.professional_views(identity).await?;
        let counts = StatusCounts::tally(&bound);
        Ok(ProfessionalStats {
            active: counts.assigned + counts.accepted,
            completed: counts.completed,
            available,
            rating: average_rating(&bound),
        })
    }

    async fn admin_summary(&self) -> Result<AdminSummary, AppError> {
        let services = self.store.list_services().await?;
        let professionals = self.store.list_professionals().await?;
        let customers = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.role == Role::Customer)
            .count();
        let views = self.store.query_requests(&RequestQuery::default()).await?;

        Ok(AdminSummary {
            total_services: services.len(),
            total_professionals: professionals.len(),
            total_customers: customers,
            total_service_requests: views.len(),
            pending_approvals: professionals
                .iter()
                .filter(|p| p.verification_status == VerificationStatus::Pending)
                .count(),
            service_request_stats: StatusCounts::tally(&views),
            average_rating: average_rating(&views),
        })
    }

    /// Requests bound to the caller, and how many are open for them to take.
    async fn professional_views(&self, identity: &Identity) -> Result<(Vec<RequestView>, usize), AppError> {
        let professional = approved_professional_of(self.store.as_ref(), identity).await?;
        let bound = self
            .store
            .query_requests(&RequestQuery {
                professional_id: Some(professional.id),
                ..Default::default()
            })
            .await?;
        let available = self
            .store
            .query_requests(&RequestQuery {
                service_id: Some(professional.service_id),
                statuses: vec![RequestStatus::Requested],
                unassigned_only: true,
                ..Default::default()
            })
            .await?
            .len();
        Ok((bound, available))
    }
}
