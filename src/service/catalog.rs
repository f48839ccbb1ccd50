use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::db::Store;
use crate::domain::{Identity, Role, Service, ServiceInput};
use crate::error::AppError;

pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Services visible to `identity`, optionally narrowed by a case-insensitive
    /// search over name and description. Inactive services are admin-only.
    pub async fn list(&self, identity: &Identity, search: Option<&str>) -> Result<Vec<Service>, AppError> {
        let needle = search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
        let services = self.store.list_services().await?;

        Ok(services
            .into_iter()
            .filter(|s| s.is_active || identity.role == Role::Admin)
            .filter(|s| match &needle {
                None => true,
                Some(needle) => {
                    s.name.to_lowercase().contains(needle)
                        || s.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(needle))
                }
            })
            .collect())
    }

    pub async fn create(&self, identity: &Identity, input: &ServiceInput) -> Result<Service, AppError> {
        identity.require_role(Role::Admin)?;
        let service = self.store.create_service(input, Utc::now().naive_utc()).await?;
        info!("Service: Catalog entry created id={}, name={}", service.id, service.name);
        Ok(service)
    }

    pub async fn update(&self, identity: &Identity, id: i32, input: &ServiceInput) -> Result<Service, AppError> {
        identity.require_role(Role::Admin)?;
        let service = self
            .store
            .update_service(id, input)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Service {} not found", id)))?;
        info!("Service: Catalog entry updated id={}", id);
        Ok(service)
    }

    /// Refused with `Conflict` while professionals or requests reference it.
    pub async fn delete(&self, identity: &Identity, id: i32) -> Result<(), AppError> {
        identity.require_role(Role::Admin)?;
        if !self.store.delete_service(id).await? {
            return Err(AppError::NotFound(format!("Service {} not found", id)));
        }
        info!("Service: Catalog entry deleted id={}", id);
        Ok(())
    }
}
