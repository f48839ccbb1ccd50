pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod identity;
pub mod reports;
pub mod service_requests;
pub mod services;
pub mod validation;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::web::{scope, ServiceConfig};
use serde::Serialize;

/// Plain `{ "message": ... }` acknowledgement.
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Signed cookie session carrying the logged-in user id.
pub fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".to_owned())
        .cookie_secure(secure)
        .cookie_http_only(true)
        .build()
}

/// Every `/api` route.
pub fn api_config(config: &mut ServiceConfig) {
    config.service(
        scope("/api")
            .configure(auth::auth_config)
            .configure(admin::admin_config)
            .configure(dashboard::dashboard_config)
            .configure(services::services_config)
            .configure(service_requests::service_requests_config)
            .configure(reports::reports_config),
    );
}
