//! Service request lifecycle as driven by customers, professionals and admins.
//!
//! Every state change is computed by [`ServiceRequest::apply`] and persisted
//! with a version check, so two actors racing on one request cannot both win.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::db::Store;
use crate::domain::{
    Customer, Identity, NewServiceRequest, Professional, RequestQuery, RequestStatus, RequestView, Role,
    ServiceRequest, Transition, Worker,
};
use crate::error::AppError;
use crate::notify::Notifier;

/// What a professional can do to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerAction {
    Accept,
    Reject,
    Complete,
}

/// Customer profile behind `identity`.
pub(crate) async fn customer_of(store: &dyn Store, identity: &Identity) -> Result<Customer, AppError> {
    identity.require_role(Role::Customer)?;
    store
        .find_customer_by_user(identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer profile not found".to_string()))
}

/// Approved professional profile behind `identity`.
pub(crate) async fn approved_professional_of(
    store: &dyn Store,
    identity: &Identity,
) -> Result<Professional, AppError> {
    identity.require_role(Role::Professional)?;
    let professional = store
        .find_professional_by_user(identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Professional profile not found".to_string()))?;
    if !professional.is_approved() {
        return Err(AppError::Forbidden("Professional account is not approved".to_string()));
    }
    Ok(professional)
}

pub(crate) async fn load_request(store: &dyn Store, id: i32) -> Result<ServiceRequest, AppError> {
    store
        .find_request(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Service request {} not found", id)))
}

/// A request that belongs to the calling customer.
pub(crate) async fn owned_request(
    store: &dyn Store,
    identity: &Identity,
    id: i32,
) -> Result<ServiceRequest, AppError> {
    let customer = customer_of(store, identity).await?;
    let request = load_request(store, id).await?;
    if request.customer_id != customer.id {
        return Err(AppError::Forbidden("Not authorized to update this request".to_string()));
    }
    Ok(request)
}

fn worker(professional: &Professional) -> Worker {
    Worker {
        professional_id: professional.id,
        service_id: professional.service_id,
    }
}

pub struct RequestService {
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
}

impl RequestService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn create(
        &self,
        identity: &Identity,
        service_id: i32,
        remarks: Option<String>,
    ) -> Result<ServiceRequest, AppError> {
        let customer = customer_of(self.store.as_ref(), identity).await?;
        self.store
            .find_service(service_id)
            .await?
            .filter(|service| service.is_active)
            .ok_or_else(|| AppError::Validation("Invalid service ID".to_string()))?;

        let request = self
            .store
            .create_request(NewServiceRequest {
                service_id,
                customer_id: customer.id,
                remarks,
                requested_at: Utc::now().naive_utc(),
            })
            .await?;
        info!(
            request_id = request.id,
            customer_id = customer.id,
            service_id,
            "Service request created"
        );
        Ok(request)
    }

    /// Role-aware listing: customers see their own requests, professionals the
    /// ones bound to them, admins everything.
    pub async fn list(&self, identity: &Identity) -> Result<Vec<RequestView>, AppError> {
        let query = match identity.role {
            Role::Admin => RequestQuery::default(),
            Role::Customer => RequestQuery {
                customer_id: Some(customer_of(self.store.as_ref(), identity).await?.id),
                ..Default::default()
            },
            Role::Professional => RequestQuery {
                professional_id: Some(approved_professional_of(self.store.as_ref(), identity).await?.id),
                ..Default::default()
            },
        };
        Ok(self.store.query_requests(&query).await?)
    }

    /// Unbound `requested` work in the caller's trade.
    pub async fn available(&self, identity: &Identity) -> Result<Vec<RequestView>, AppError> {
        let professional = approved_professional_of(self.store.as_ref(), identity).await?;
        let query = RequestQuery {
            service_id: Some(professional.service_id),
            statuses: vec![RequestStatus::Requested],
            unassigned_only: true,
            ..Default::default()
        };
        Ok(self.store.query_requests(&query).await?)
    }

    /// Customer edit: replace remarks and/or close finished work.
    pub async fn update(
        &self,
        identity: &Identity,
        id: i32,
        remarks: Option<String>,
        close: bool,
    ) -> Result<ServiceRequest, AppError> {
        let current = owned_request(self.store.as_ref(), identity, id).await?;
        let mut next = if close {
            current.apply(&Transition::Close, Utc::now().naive_utc())?
        } else {
            current.clone()
        };
        if let Some(remarks) = remarks {
            next.remarks = Some(remarks);
        }
        if next == current {
            return Ok(current);
        }

        let saved = self.store.save_request(&next).await?;
        info!(request_id = id, status = %saved.status, "Service request updated by customer");
        Ok(saved)
    }

    /// Withdraw a request that has not been finished. The request is deleted.
    pub async fn cancel(&self, identity: &Identity, id: i32) -> Result<(), AppError> {
        let current = owned_request(self.store.as_ref(), identity, id).await?;
        current.ensure_cancellable()?;
        self.store.delete_request(current.id, current.version).await?;
        info!(request_id = id, "Service request cancelled");
        Ok(())
    }

    pub async fn act(&self, identity: &Identity, id: i32, action: WorkerAction) -> Result<ServiceRequest, AppError> {
        let professional = approved_professional_of(self.store.as_ref(), identity).await?;
        let current = load_request(self.store.as_ref(), id).await?;
        let acting = worker(&professional);

        let transition = match action {
            WorkerAction::Accept => Transition::Accept(acting),
            WorkerAction::Reject => Transition::Reject(acting),
            WorkerAction::Complete => Transition::Complete(acting),
        };
        let saved = self.commit(&current, transition).await?;

        if action == WorkerAction::Complete {
            if let Some(view) = self.view_for_mail(saved.id).await {
                self.notifier.request_completed(&view);
            }
        }
        Ok(saved)
    }

    /// Admin binds an approved professional of the right trade.
    pub async fn assign(&self, identity: &Identity, id: i32, professional_id: i32) -> Result<ServiceRequest, AppError> {
        identity.require_role(Role::Admin)?;
        let current = load_request(self.store.as_ref(), id).await?;
        let professional = self
            .store
            .find_professional(professional_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Professional {} not found", professional_id)))?;
        if !professional.is_approved() {
            return Err(AppError::Forbidden(format!(
                "Professional {} is not approved",
                professional_id
            )));
        }

        let saved = self.commit(&current, Transition::Assign(worker(&professional))).await?;
        if saved.version != current.version {
            if let Some(view) = self.view_for_mail(saved.id).await {
                self.notifier.request_assigned(&view);
            }
        }
        Ok(saved)
    }

    pub async fn override_status(
        &self,
        identity: &Identity,
        id: i32,
        status: RequestStatus,
    ) -> Result<ServiceRequest, AppError> {
        identity.require_role(Role::Admin)?;
        let current = load_request(self.store.as_ref(), id).await?;
        self.commit(&current, Transition::Override(status)).await
    }

    async fn commit(&self, current: &ServiceRequest, transition: Transition) -> Result<ServiceRequest, AppError> {
        let next = current.apply(&transition, Utc::now().naive_utc())?;
        if next == *current {
            return Ok(next);
        }

        let saved = self.store.save_request(&next).await?;
        info!(
            request_id = saved.id,
            action = transition.name(),
            from = %current.status,
            to = %saved.status,
            "Service request transition"
        );
        Ok(saved)
    }

    async fn view_for_mail(&self, id: i32) -> Option<RequestView> {
        match self.store.query_requests(&RequestQuery::by_id(id)).await {
            Ok(mut views) => views.pop(),
            Err(e) => {
                warn!(request_id = id, "Skipping notification, request lookup failed: {}", e);
                None
            }
        }
    }
}
