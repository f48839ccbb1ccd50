//! Registration, the bootstrap admin and admin-side account management.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AdminSettings;
use crate::db::{Store, StoreError};
use crate::domain::{
    Customer, Identity, NewCustomer, NewProfessional, NewUser, Professional, Role, User, VerificationStatus,
};
use crate::error::AppError;
use crate::service::auth::hash_password;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct CustomerRegistration {
    pub account: Registration,
    pub address: String,
    pub pin_code: String,
}

#[derive(Debug, Clone)]
pub struct ProfessionalRegistration {
    pub account: Registration,
    pub service_id: i32,
    pub experience: i32,
    pub description: Option<String>,
    /// Stored file name of the uploaded verification documents.
    pub documents: Option<String>,
}

/// The role-specific half of an account.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Profile {
    Admin,
    Customer(Customer),
    Professional(Professional),
}

/// Self-service profile changes. Absent fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub address: Option<String>,
    pub pin_code: Option<String>,
    pub experience: Option<i32>,
    pub description: Option<String>,
}

impl ProfileUpdate {
    fn touches_customer_fields(&self) -> bool {
        self.address.is_some() || self.pin_code.is_some()
    }

    fn touches_professional_fields(&self) -> bool {
        self.experience.is_some() || self.description.is_some()
    }
}

fn non_blank(value: Option<String>, current: &str, field: &str) -> Result<String, AppError> {
    match value {
        None => Ok(current.to_string()),
        Some(v) if v.trim().is_empty() => Err(AppError::Validation(format!("{} must not be empty", field))),
        Some(v) => Ok(v.trim().to_string()),
    }
}

pub struct AccountService {
    store: Arc<dyn Store>,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn register_customer(&self, input: CustomerRegistration) -> Result<(User, Customer), AppError> {
        let user = self.new_user(input.account)?;
        info!("Service: Registering customer username={}", user.username);

        let customer = NewCustomer {
            user,
            address: input.address,
            pin_code: input.pin_code,
        };
        let (user, customer) = self
            .store
            .create_customer(customer, Utc::now().naive_utc())
            .await
            .map_err(duplicate_account)?;

        info!("Service: Customer registered user_id={}", user.id);
        Ok((user, customer))
    }

    pub async fn register_professional(
        &self,
        input: ProfessionalRegistration,
    ) -> Result<(User, Professional), AppError> {
        if input.experience < 0 {
            return Err(AppError::Validation("Experience must not be negative".to_string()));
        }
        if self.store.find_service(input.service_id).await?.is_none() {
            return Err(AppError::Validation("Invalid service ID".to_string()));
        }

        let user = self.new_user(input.account)?;
        info!("Service: Registering professional username={}", user.username);

        let professional = NewProfessional {
            user,
            service_id: input.service_id,
            experience: input.experience,
            description: input.description,
            documents: input.documents,
        };
        let (user, professional) = self
            .store
            .create_professional(professional, Utc::now().naive_utc())
            .await
            .map_err(duplicate_account)?;

        info!(
            "Service: Professional registered user_id={}, awaiting verification",
            user.id
        );
        Ok((user, professional))
    }

    fn new_user(&self, account: Registration) -> Result<NewUser, AppError> {
        if account.password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(NewUser {
            username: account.username,
            email: account.email,
            password_hash: hash_password(&account.password)?,
        })
    }

    /// Make sure the single admin account exists.
    ///
    /// Returns the admin when one was created by this call.
    pub async fn bootstrap_admin(&self, settings: &AdminSettings) -> Result<Option<User>, AppError> {
        let Some(password) = settings.password.as_deref() else {
            return match self.store.find_user_by_username(&settings.username).await? {
                Some(user) if user.role == Role::Admin => Ok(None),
                _ => Err(AppError::Validation(
                    "ADMIN_PASSWORD must be set until the admin account exists".to_string(),
                )),
            };
        };

        let admin = NewUser {
            username: settings.username.clone(),
            email: settings.email.clone(),
            password_hash: hash_password(password)?,
        };
        let created = self
            .store
            .create_admin_if_absent(admin, Utc::now().naive_utc())
            .await?;
        match &created {
            Some(user) => info!("Admin account '{}' created", user.username),
            None => info!("Admin account already present"),
        }
        Ok(created)
    }

    pub async fn profile(&self, identity: &Identity) -> Result<Profile, AppError> {
        let missing = || AppError::NotFound("Profile not found".to_string());
        match identity.role {
            Role::Admin => Ok(Profile::Admin),
            Role::Customer => self
                .store
                .find_customer_by_user(identity.user_id)
                .await?
                .map(Profile::Customer)
                .ok_or_else(missing),
            Role::Professional => self
                .store
                .find_professional_by_user(identity.user_id)
                .await?
                .map(Profile::Professional)
                .ok_or_else(missing),
        }
    }

    pub async fn update_profile(&self, identity: &Identity, update: ProfileUpdate) -> Result<Profile, AppError> {
        let missing = || AppError::NotFound("Profile not found".to_string());
        match identity.role {
            Role::Admin => Err(AppError::Forbidden("The admin account has no editable profile".to_string())),
            Role::Customer => {
                if update.touches_professional_fields() {
                    return Err(AppError::Validation(
                        "Customers can only change address and pin_code".to_string(),
                    ));
                }
                let current = self
                    .store
                    .find_customer_by_user(identity.user_id)
                    .await?
                    .ok_or_else(missing)?;
                let address = non_blank(update.address, &current.address, "address")?;
                let pin_code = non_blank(update.pin_code, &current.pin_code, "pin_code")?;

                let updated = self
                    .store
                    .update_customer(current.id, &address, &pin_code)
                    .await?
                    .ok_or_else(missing)?;
                info!("Service: Customer {} updated their profile", updated.id);
                Ok(Profile::Customer(updated))
            }
            Role::Professional => {
                if update.touches_customer_fields() {
                    return Err(AppError::Validation(
                        "Professionals can only change experience and description".to_string(),
                    ));
                }
                let current = self
                    .store
                    .find_professional_by_user(identity.user_id)
                    .await?
                    .ok_or_else(missing)?;
                let experience = update.experience.unwrap_or(current.experience);
                if experience < 0 {
                    return Err(AppError::Validation("Experience must not be negative".to_string()));
                }
                let description = match update.description {
                    Some(text) if text.trim().is_empty() => None,
                    Some(text) => Some(text),
                    None => current.description,
                };

                let updated = self
                    .store
                    .update_professional(current.id, experience, description.as_deref())
                    .await?
                    .ok_or_else(missing)?;
                info!("Service: Professional {} updated their profile", updated.id);
                Ok(Profile::Professional(updated))
            }
        }
    }

    pub async fn list_users(&self, identity: &Identity) -> Result<Vec<User>, AppError> {
        identity.require_role(Role::Admin)?;
        Ok(self.store.list_users().await?)
    }

    /// Flip a user between active and blocked.
    pub async fn toggle_user_status(&self, identity: &Identity, user_id: i32) -> Result<User, AppError> {
        identity.require_role(Role::Admin)?;
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        if user.role == Role::Admin {
            return Err(AppError::Forbidden("Cannot change the admin account status".to_string()));
        }

        let updated = self
            .store
            .set_user_active(user_id, !user.is_active)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        info!(
            "Service: User {} is now {}",
            user_id,
            if updated.is_active { "active" } else { "blocked" }
        );
        Ok(updated)
    }

    pub async fn list_professionals(&self, identity: &Identity) -> Result<Vec<Professional>, AppError> {
        identity.require_role(Role::Admin)?;
        Ok(self.store.list_professionals().await?)
    }

    pub async fn verify_professional(
        &self,
        identity: &Identity,
        professional_id: i32,
        status: VerificationStatus,
    ) -> Result<Professional, AppError> {
        identity.require_role(Role::Admin)?;
        if status == VerificationStatus::Pending {
            return Err(AppError::Validation(
                "Verification status must be approved or rejected".to_string(),
            ));
        }

        let professional = self
            .store
            .set_verification(professional_id, status)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Professional {} not found", professional_id)))?;
        info!(
            "Service: Professional {} verification set to {}",
            professional_id,
            status.as_str()
        );
        Ok(professional)
    }
}

fn duplicate_account(err: StoreError) -> AppError {
    match err {
        StoreError::Duplicate(constraint) if constraint.contains("username") => {
            warn!("Registration refused: username taken");
            AppError::Conflict("Username already exists".to_string())
        }
        StoreError::Duplicate(constraint) if constraint.contains("email") => {
            warn!("Registration refused: email taken");
            AppError::Conflict("Email already registered".to_string())
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::domain::ServiceInput;

    fn account(name: &str) -> Registration {
        Registration {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password: "long enough".to_string(),
        }
    }

    fn admin() -> Identity {
        Identity {
            user_id: 1,
            username: "admin".to_string(),
            role: Role::Admin,
        }
    }

    fn settings(password: Option<&str>) -> AdminSettings {
        AdminSettings {
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password: password.map(String::from),
        }
    }

    async fn service_id(store: &InMemoryStore) -> i32 {
        let input = ServiceInput {
            name: "Cleaning".to_string(),
            description: None,
            base_price: 30.0,
            time_required: 90,
            is_active: true,
        };
        store.create_service(&input, Utc::now().naive_utc()).await.expect("service").id
    }

    #[tokio::test]
    async fn duplicate_username_reads_as_conflict() {
        let accounts = AccountService::new(Arc::new(InMemoryStore::new()));
        let registration = CustomerRegistration {
            account: account("carol"),
            address: "1 Main St".to_string(),
            pin_code: "560001".to_string(),
        };
        accounts.register_customer(registration.clone()).await.expect("first");
        let err = accounts.register_customer(registration).await.expect_err("second");
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Username already exists"));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let accounts = AccountService::new(Arc::new(InMemoryStore::new()));
        let mut registration = CustomerRegistration {
            account: account("carol"),
            address: "1 Main St".to_string(),
            pin_code: "560001".to_string(),
        };
        registration.account.password = "short".to_string();
        assert!(matches!(
            accounts.register_customer(registration).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn professional_starts_pending_and_needs_known_service() {
        let store = Arc::new(InMemoryStore::new());
        let accounts = AccountService::new(store.clone());
        let registration = |service_id| ProfessionalRegistration {
            account: account("pat"),
            service_id,
            experience: 4,
            description: None,
            documents: None,
        };

        assert!(matches!(
            accounts.register_professional(registration(99)).await,
            Err(AppError::Validation(_))
        ));

        let (_, professional) = accounts
            .register_professional(registration(service_id(&store).await))
            .await
            .expect("register");
        assert_eq!(professional.verification_status, VerificationStatus::Pending);

        let approved = accounts
            .verify_professional(&admin(), professional.id, VerificationStatus::Approved)
            .await
            .expect("verify");
        assert!(approved.is_approved());
        assert!(matches!(
            accounts
                .verify_professional(&admin(), professional.id, VerificationStatus::Pending)
                .await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn admin_is_created_once_and_cannot_be_toggled() {
        let accounts = AccountService::new(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            accounts.bootstrap_admin(&settings(None)).await,
            Err(AppError::Validation(_))
        ));

        let created = accounts
            .bootstrap_admin(&settings(Some("admin-password")))
            .await
            .expect("bootstrap")
            .expect("created");
        assert!(accounts
            .bootstrap_admin(&settings(Some("admin-password")))
            .await
            .expect("bootstrap")
            .is_none());
        assert!(accounts.bootstrap_admin(&settings(None)).await.expect("bootstrap").is_none());

        let err = accounts.toggle_user_status(&admin(), created.id).await.expect_err("admin");
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn customer_edits_address_and_keeps_the_rest() {
        let accounts = AccountService::new(Arc::new(InMemoryStore::new()));
        let (user, _) = accounts
            .register_customer(CustomerRegistration {
                account: account("carol"),
                address: "1 Main St".to_string(),
                pin_code: "560001".to_string(),
            })
            .await
            .expect("register");
        let carol = Identity {
            user_id: user.id,
            username: "carol".to_string(),
            role: Role::Customer,
        };

        let update = ProfileUpdate {
            address: Some("  9 Lake Rd ".to_string()),
            ..Default::default()
        };
        let Profile::Customer(customer) = accounts.update_profile(&carol, update).await.expect("update") else {
            panic!("customer profile expected");
        };
        assert_eq!(customer.address, "9 Lake Rd");
        assert_eq!(customer.pin_code, "560001");

        let blank = ProfileUpdate {
            pin_code: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            accounts.update_profile(&carol, blank).await,
            Err(AppError::Validation(_))
        ));
        let foreign = ProfileUpdate {
            experience: Some(3),
            ..Default::default()
        };
        assert!(matches!(
            accounts.update_profile(&carol, foreign).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            accounts.update_profile(&admin(), ProfileUpdate::default()).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn professional_edits_experience_but_not_verification() {
        let store = Arc::new(InMemoryStore::new());
        let accounts = AccountService::new(store.clone());
        let (user, registered) = accounts
            .register_professional(ProfessionalRegistration {
                account: account("pat"),
                service_id: service_id(&store).await,
                experience: 4,
                description: Some("Pipes".to_string()),
                documents: None,
            })
            .await
            .expect("register");
        let pat = Identity {
            user_id: user.id,
            username: "pat".to_string(),
            role: Role::Professional,
        };

        let update = ProfileUpdate {
            experience: Some(6),
            ..Default::default()
        };
        let Profile::Professional(professional) = accounts.update_profile(&pat, update).await.expect("update")
        else {
            panic!("professional profile expected");
        };
        assert_eq!(professional.experience, 6);
        assert_eq!(professional.description.as_deref(), Some("Pipes"));
        assert_eq!(professional.verification_status, VerificationStatus::Pending);
        assert_eq!(professional.service_id, registered.service_id);

        let negative = ProfileUpdate {
            experience: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            accounts.update_profile(&pat, negative).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn toggling_flips_activity_and_requires_admin() {
        let accounts = AccountService::new(Arc::new(InMemoryStore::new()));
        let (user, _) = accounts
            .register_customer(CustomerRegistration {
                account: account("carol"),
                address: "1 Main St".to_string(),
                pin_code: "560001".to_string(),
            })
            .await
            .expect("register");

        let blocked = accounts.toggle_user_status(&admin(), user.id).await.expect("toggle");
        assert!(!blocked.is_active);
        let active = accounts.toggle_user_status(&admin(), user.id).await.expect("toggle");
        assert!(active.is_active);

        let customer = Identity {
            user_id: user.id,
            username: "carol".to_string(),
            role: Role::Customer,
        };
        assert!(matches!(
            accounts.toggle_user_status(&customer, user.id).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
