//! End-to-end scenarios over the in-memory store.

pub mod support {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, NaiveDateTime};

    use crate::db::Store;
    use crate::domain::{
        Identity, NewCustomer, NewProfessional, NewServiceRequest, NewUser, RequestStatus, Role, ServiceInput,
        ServiceRequest, User, VerificationStatus,
    };

    /// 09:00 on the given day.
    pub fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid timestamp")
    }

    fn identity(user: &User) -> Identity {
        Identity {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password_hash: "unused".to_string(),
        }
    }

    /// A user together with the id of their customer or professional profile.
    pub struct Member {
        pub identity: Identity,
        pub profile_id: i32,
    }

    /// A store seeded with an admin, a plumbing service and customer carol.
    pub struct Marketplace {
        pub store: Arc<dyn Store>,
        pub admin: Identity,
        pub plumbing: i32,
        pub carol: Member,
    }

    async fn add_customer(store: &dyn Store, name: &str) -> Member {
        let (user, customer) = store
            .create_customer(
                NewCustomer {
                    user: new_user(name),
                    address: "1 Main St".to_string(),
                    pin_code: "560001".to_string(),
                },
                at(2024, 1, 1),
            )
            .await
            .expect("customer");
        Member {
            identity: identity(&user),
            profile_id: customer.id,
        }
    }

    async fn add_service(store: &dyn Store, name: &str, is_active: bool) -> i32 {
        let input = ServiceInput {
            name: name.to_string(),
            description: None,
            base_price: 50.0,
            time_required: 60,
            is_active,
        };
        store.create_service(&input, at(2024, 1, 1)).await.expect("service").id
    }

    impl Marketplace {
        pub async fn seed(store: Arc<dyn Store>) -> Self {
            let admin = store
                .create_admin_if_absent(new_user("admin"), at(2024, 1, 1))
                .await
                .expect("admin")
                .expect("first admin");
            let plumbing = add_service(store.as_ref(), "Plumbing", true).await;
            let carol = add_customer(store.as_ref(), "carol").await;

            Marketplace {
                admin: identity(&admin),
                plumbing,
                carol,
                store,
            }
        }

        pub async fn service(&self, name: &str, is_active: bool) -> i32 {
            add_service(self.store.as_ref(), name, is_active).await
        }

        pub async fn customer(&self, name: &str) -> Member {
            add_customer(self.store.as_ref(), name).await
        }

        /// An approved professional offering `service_id`.
        pub async fn professional(&self, name: &str, service_id: i32) -> Member {
            let (user, professional) = self
                .store
                .create_professional(
                    NewProfessional {
                        user: new_user(name),
                        service_id,
                        experience: 5,
                        description: None,
                        documents: None,
                    },
                    at(2024, 1, 1),
                )
                .await
                .expect("professional");
            self.store
                .set_verification(professional.id, VerificationStatus::Approved)
                .await
                .expect("approve");
            assert_eq!(user.role, Role::Professional);
            Member {
                identity: identity(&user),
                profile_id: professional.id,
            }
        }

        pub async fn request_for(&self, customer_id: i32, requested_at: NaiveDateTime) -> ServiceRequest {
            self.store
                .create_request(NewServiceRequest {
                    service_id: self.plumbing,
                    customer_id,
                    remarks: None,
                    requested_at,
                })
                .await
                .expect("request")
        }

        /// A plumbing request of carol's placed directly in `status`.
        /// Finished requests complete the day after they were requested.
        pub async fn request_in(
            &self,
            status: RequestStatus,
            professional_id: Option<i32>,
            requested_at: NaiveDateTime,
        ) -> ServiceRequest {
            let request = self.request_for(self.carol.profile_id, requested_at).await;
            if status == RequestStatus::Requested && professional_id.is_none() {
                return request;
            }

            let mut next = request;
            next.status = status;
            next.professional_id = professional_id;
            if status.is_finished() {
                next.completed_at = Some(requested_at + Duration::days(1));
            }
            self.store.save_request(&next).await.expect("save")
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use actix_web::{cookie::Key, http::StatusCode, test, App};
use chrono::Utc;
use serde_json::{json, Value};

use crate::api::{api_config, health::health_config, session_middleware, validation};
use crate::db::{InMemoryStore, Store};
use crate::domain::{
    DateRange, ExportFormat, ExportJobStatus, FilterCriterion, RequestStatus, ServiceRequest,
};
use crate::error::AppError;
use crate::notify::mailer::testing::RecordingMailer;
use crate::notify::Email;
use crate::report::COLUMNS;
use crate::service::requests::WorkerAction;
use crate::service::{AppContext, ContextSettings};
use crate::worker::ExportProcessor;
use support::{at, Marketplace};

struct Harness {
    ctx: actix_web::web::Data<AppContext>,
    market: Marketplace,
    mailer: Arc<RecordingMailer>,
    dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let market = Marketplace::seed(store.clone()).await;
    let mailer = Arc::new(RecordingMailer::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = AppContext::new(
        store,
        mailer.clone(),
        ContextSettings {
            jwt_secret: "scenario-secret".to_string(),
            export_dir: dir.path().join("exports"),
            upload_dir: dir.path().join("uploads"),
        },
    );
    Harness {
        ctx: actix_web::web::Data::new(ctx),
        market,
        mailer,
        dir,
    }
}

/// Lifecycle mail is spawned; give it a moment to land.
async fn wait_for_mail(mailer: &RecordingMailer, count: usize) -> Vec<Email> {
    for _ in 0..100 {
        let sent = mailer.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    mailer.sent()
}

#[actix_web::test]
async fn request_walks_from_creation_to_a_single_review() {
    let h = harness().await;
    let carol = &h.market.carol.identity;
    let pat = h.market.professional("pat", h.market.plumbing).await;
    let requests = &h.ctx.requests;

    let created = requests.create(carol, h.market.plumbing, Some("Leaking tap".into())).await.expect("create");
    assert_eq!(created.status, RequestStatus::Requested);

    let assigned = requests.assign(&h.market.admin, created.id, pat.profile_id).await.expect("assign");
    assert_eq!((assigned.status, assigned.professional_id), (RequestStatus::Assigned, Some(pat.profile_id)));

    let accepted = requests.act(&pat.identity, created.id, WorkerAction::Accept).await.expect("accept");
    assert_eq!(accepted.status, RequestStatus::Accepted);

    let completed = requests.act(&pat.identity, created.id, WorkerAction::Complete).await.expect("complete");
    assert_eq!(completed.status, RequestStatus::Completed);
    assert!(completed.completed_at.is_some());

    let closed = requests.update(carol, created.id, None, true).await.expect("close");
    assert_eq!(closed.status, RequestStatus::Closed);

    let review = h.ctx.reviews.add(carol, created.id, 4, None).await.expect("review");
    assert_eq!(review.rating.value(), 4);
    assert!(matches!(
        h.ctx.reviews.add(carol, created.id, 5, None).await,
        Err(AppError::Conflict(_))
    ));

    let sent = wait_for_mail(&h.mailer, 2).await;
    let recipients: Vec<&str> = sent.iter().map(|e| e.to.as_str()).collect();
    assert!(recipients.contains(&"pat@example.com"));
    assert!(recipients.contains(&"carol@example.com"));

    let listed = requests.list(carol).await.expect("list");
    assert_eq!(listed[0].rating, Some(4));
    assert!(listed[0].has_review());
}

#[actix_web::test]
async fn skipping_states_is_refused() {
    let h = harness().await;
    let carol = &h.market.carol.identity;
    let pat = h.market.professional("pat", h.market.plumbing).await;
    let request = h.ctx.requests.create(carol, h.market.plumbing, None).await.expect("create");

    assert!(matches!(
        h.ctx.requests.update(carol, request.id, None, true).await,
        Err(AppError::Conflict(_))
    ));
    h.ctx
        .requests
        .assign(&h.market.admin, request.id, pat.profile_id)
        .await
        .expect("assign");
    assert!(matches!(
        h.ctx.requests.act(&pat.identity, request.id, WorkerAction::Complete).await,
        Err(AppError::Conflict(_))
    ));
}

async fn completed_on(market: &Marketplace, requested_at: chrono::NaiveDateTime) -> ServiceRequest {
    market.request_in(RequestStatus::Completed, None, requested_at).await
}

#[actix_web::test]
async fn export_of_this_months_completed_requests_has_two_rows() {
    let h = harness().await;
    let now = at(2024, 5, 20);
    completed_on(&h.market, at(2024, 5, 3)).await;
    completed_on(&h.market, at(2024, 5, 10)).await;
    completed_on(&h.market, at(2024, 4, 15)).await;
    h.market.request_in(RequestStatus::Requested, None, at(2024, 5, 12)).await;

    let job = h
        .ctx
        .exports
        .enqueue(
            &h.market.admin,
            ExportFormat::Csv,
            vec![
                FilterCriterion::Status(RequestStatus::Completed),
                FilterCriterion::DateRange(DateRange::ThisMonth),
            ],
            None,
        )
        .await
        .expect("enqueue");
    assert_eq!(job.status, ExportJobStatus::Pending);

    let claimed = h.market.store.claim_next_export_job(now).await.expect("claim").expect("job");
    let export_dir = h.dir.path().join("exports");
    let processor = ExportProcessor::new(h.market.store.clone(), h.mailer.clone(), export_dir.clone());
    let done = processor.process(claimed, now).await.expect("process");
    assert_eq!(done.status, ExportJobStatus::Completed);

    let file_name = done.file_name.expect("file");
    let csv = std::fs::read_to_string(export_dir.join(&file_name)).expect("read");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], COLUMNS.join(","));
    assert_eq!(lines.len(), 3);
    assert!(lines[1..].iter().all(|line| line.contains(",completed,")));

    let download = h.ctx.exports.download(&h.market.admin, &file_name).await.expect("download");
    assert_eq!(download.path, export_dir.join(&file_name));
}

#[actix_web::test]
async fn export_header_is_fixed_even_when_empty() {
    let h = harness().await;
    h.ctx
        .exports
        .enqueue(&h.market.admin, ExportFormat::Csv, vec![], None)
        .await
        .expect("enqueue");
    let now = Utc::now().naive_utc();
    let claimed = h.market.store.claim_next_export_job(now).await.expect("claim").expect("job");
    let processor = ExportProcessor::new(h.market.store.clone(), h.mailer.clone(), h.dir.path().to_path_buf());
    let done = processor.process(claimed, now).await.expect("process");

    let csv = std::fs::read_to_string(h.dir.path().join(done.file_name.expect("file"))).expect("read");
    assert_eq!(
        csv.trim_end(),
        "ID,Service,Customer,Professional,Date Requested,Date Completed,Status,Remarks,Rating"
    );
}

mod http {
    use super::*;
    use actix_web::http::header;

    macro_rules! app {
        ($h:expr) => {
            test::init_service(
                App::new()
                    .wrap(session_middleware(Key::generate(), false))
                    .app_data($h.ctx.clone())
                    .app_data(validation::json_config())
                    .configure(health_config)
                    .configure(api_config),
            )
            .await
        };
    }

    fn bearer(h: &Harness, identity: &crate::domain::Identity) -> (header::HeaderName, String) {
        let user = crate::domain::User {
            id: identity.user_id,
            username: identity.username.clone(),
            email: String::new(),
            role: identity.role,
            is_active: true,
            created_at: Utc::now().naive_utc(),
            password_hash: String::new(),
        };
        let token = h.ctx.auth.issue_token(&user, Utc::now()).expect("token");
        (header::AUTHORIZATION, format!("Bearer {}", token))
    }

    #[actix_web::test]
    async fn health_reports_store_reachable() {
        let h = harness().await;
        let app = app!(h);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn anonymous_calls_get_the_error_envelope() {
        let h = harness().await;
        let app = app!(h);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/service-requests").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Authentication required");
        assert!(body["fields"]["message"].is_string());
    }

    #[actix_web::test]
    async fn register_login_and_use_either_credential() {
        let h = harness().await;
        let app = app!(h);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/auth/register/customer")
                .set_json(json!({
                    "username": "dana",
                    "email": "dana@example.com",
                    "password": "long enough",
                    "address": "2 High St",
                    "pin_code": "560002"
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({"username": "dana", "password": "long enough"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == "session")
            .map(|c| c.into_owned())
            .expect("session cookie");
        let body: Value = test::read_body_json(resp).await;
        let token = body["token"].as_str().expect("token").to_string();
        assert!(body["user"].get("password_hash").is_none());

        let via_token = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/auth/me")
                .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
                .to_request(),
        )
        .await;
        assert_eq!(via_token.status(), StatusCode::OK);
        let via_token: Value = test::read_body_json(via_token).await;

        let via_cookie = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/auth/me").cookie(cookie).to_request(),
        )
        .await;
        assert_eq!(via_cookie.status(), StatusCode::OK);
        let via_cookie: Value = test::read_body_json(via_cookie).await;

        assert_eq!(via_token["identity"], via_cookie["identity"]);
        assert_eq!(via_token["identity"]["role"], "customer");
        assert_eq!(via_token["profile"]["kind"], "customer");
    }

    #[actix_web::test]
    async fn short_password_fails_validation() {
        let h = harness().await;
        let app = app!(h);
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/auth/register/customer")
                .set_json(json!({
                    "username": "dana",
                    "email": "dana@example.com",
                    "password": "short",
                    "address": "2 High St",
                    "pin_code": "560002"
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Validation failed");
        assert!(body["fields"]["password"]["errors"].is_array());
    }

    #[actix_web::test]
    async fn request_routes_enforce_roles_and_rating_range() {
        let h = harness().await;
        let app = app!(h);
        let carol = bearer(&h, &h.market.carol.identity);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/service-requests")
                .insert_header(carol.clone())
                .set_json(json!({"service_id": h.market.plumbing, "remarks": "Blocked drain"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Service request created successfully");
        let id = body["request_id"].as_i64().expect("request id");

        let resp = test::call_service(
            &app,
            test::TestRequest::put()
                .uri(&format!("/api/service-requests/{}/status", id))
                .insert_header(carol.clone())
                .set_json(json!({"status": "completed"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/api/service-requests/{}/review", id))
                .insert_header(carol.clone())
                .set_json(json!({"rating": 9}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(
            &app,
            test::TestRequest::put()
                .uri(&format!("/api/service-requests/{}/cancel", id))
                .insert_header(carol)
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(h.market.store.find_request(id as i32).await.expect("find").is_none());
    }

    #[actix_web::test]
    async fn unknown_status_value_is_a_bad_request() {
        let h = harness().await;
        let app = app!(h);
        let admin = bearer(&h, &h.market.admin);
        let request = h.market.request_in(RequestStatus::Requested, None, at(2024, 5, 2)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::put()
                .uri(&format!("/api/service-requests/{}/status", request.id))
                .insert_header(admin)
                .set_json(json!({"status": "pending"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn export_jobs_are_queued_and_polled_by_their_owner() {
        let h = harness().await;
        let app = app!(h);
        let admin = bearer(&h, &h.market.admin);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/reports/export-jobs")
                .insert_header(admin.clone())
                .set_json(json!({"status": "completed", "date_range": "this_month"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(resp).await;
        let job_id = body["job_id"].as_i64().expect("job id");

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/api/reports/export-status/{}", job_id))
                .insert_header(admin)
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let descriptor: Value = test::read_body_json(resp).await;
        assert_eq!(descriptor["status"], "pending");
        assert_eq!(descriptor["job_type"], "service_requests_csv");
        assert!(descriptor["file_url"].is_null());

        let carol = bearer(&h, &h.market.carol.identity);
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/api/reports/export-status/{}", job_id))
                .insert_header(carol.clone())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/reports/export-jobs")
                .insert_header(carol)
                .set_json(json!({}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn dashboards_follow_the_caller_role() {
        let h = harness().await;
        let app = app!(h);
        let pat = h.market.professional("pat", h.market.plumbing).await;
        h.market
            .request_in(RequestStatus::Assigned, Some(pat.profile_id), at(2024, 5, 2))
            .await;
        h.market.request_in(RequestStatus::Requested, None, at(2024, 5, 3)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/dashboard-summary")
                .insert_header(bearer(&h, &h.market.carol.identity))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["role"], "customer");
        assert_eq!(body["total_requests"], 2);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/dashboard/stats")
                .insert_header(bearer(&h, &pat.identity))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["active"], 1);
        assert_eq!(body["available"], 1);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/dashboard/stats")
                .insert_header(bearer(&h, &h.market.admin))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn profile_edit_is_limited_to_own_role_fields() {
        let h = harness().await;
        let app = app!(h);
        let carol = bearer(&h, &h.market.carol.identity);

        let resp = test::call_service(
            &app,
            test::TestRequest::put()
                .uri("/api/profile")
                .insert_header(carol.clone())
                .set_json(json!({"pin_code": "560099"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Profile updated successfully");
        assert_eq!(body["profile"]["pin_code"], "560099");

        let resp = test::call_service(
            &app,
            test::TestRequest::put()
                .uri("/api/profile")
                .insert_header(carol)
                .set_json(json!({"experience": 3}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
