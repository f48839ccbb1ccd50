pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod dashboard;
pub mod exports;
pub mod requests;
pub mod reviews;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::db::Store;
use crate::notify::{Mailer, Notifier};

pub use accounts::AccountService;
pub use auth::AuthService;
pub use catalog::CatalogService;
pub use dashboard::DashboardService;
pub use exports::ExportService;
pub use requests::RequestService;
pub use reviews::ReviewService;

/// The slice of configuration the services need.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub jwt_secret: String,
    pub export_dir: PathBuf,
    pub upload_dir: PathBuf,
}

/// Every service, built once at startup and handed to handlers and workers.
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<Notifier>,
    pub auth: AuthService,
    pub accounts: AccountService,
    pub catalog: CatalogService,
    pub dashboards: DashboardService,
    pub requests: RequestService,
    pub reviews: ReviewService,
    pub exports: ExportService,
    pub upload_dir: PathBuf,
    /// Signalled when a new export job is queued.
    pub export_wake: Arc<Notify>,
}

impl AppContext {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, settings: ContextSettings) -> Self {
        let notifier = Arc::new(Notifier::new(store.clone(), mailer));
        let export_wake = Arc::new(Notify::new());

        AppContext {
            auth: AuthService::new(store.clone(), settings.jwt_secret),
            accounts: AccountService::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            dashboards: DashboardService::new(store.clone()),
            requests: RequestService::new(store.clone(), notifier.clone()),
            reviews: ReviewService::new(store.clone()),
            exports: ExportService::new(store.clone(), settings.export_dir, export_wake.clone()),
            upload_dir: settings.upload_dir,
            export_wake,
            notifier,
            store,
        }
    }
}
