pub mod catalog;
pub mod export;
pub mod identity;
pub mod lifecycle;
pub mod request_view;
pub mod review;

pub use catalog::{Service, ServiceInput};
pub use export::{DateRange, ExportFilter, ExportFormat, ExportJob, ExportJobStatus, FilterCriterion, NewExportJob};
pub use identity::{Customer, Identity, NewCustomer, NewProfessional, NewUser, Professional, Role, User, VerificationStatus};
pub use lifecycle::{NewServiceRequest, RequestStatus, ServiceRequest, Transition, TransitionError, Worker};
pub use request_view::{RequestQuery, RequestView};
pub use review::{NewReview, Rating, Review};
