use actix_web::{
    get, post, put,
    web::{scope, Data, Path, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::MessageResponse;
use crate::domain::{Identity, RequestStatus, Review, ServiceRequest};
use crate::error::AppError;
use crate::service::requests::WorkerAction;
use crate::service::AppContext;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRequestBody {
    pub service_id: i32,
    #[validate(length(max = 1000, message = "Remarks must be at most 1000 characters"))]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerAction {
    Close,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRequestBody {
    #[validate(length(max = 1000, message = "Remarks must be at most 1000 characters"))]
    pub remarks: Option<String>,
    pub action: Option<CustomerAction>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActionBody {
    pub action: WorkerAction,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignBody {
    pub professional_id: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusBody {
    pub status: RequestStatus,
}

/// Range is checked by the review service so the message matches every path.
#[derive(Debug, Deserialize, Validate)]
pub struct ReviewBody {
    pub rating: i64,
    #[validate(length(max = 2000, message = "Comments must be at most 2000 characters"))]
    pub comments: Option<String>,
}

#[derive(Serialize)]
struct CreatedResponse {
    message: String,
    request_id: i32,
}

#[derive(Serialize)]
struct RequestResponse {
    message: String,
    service_request: ServiceRequest,
}

#[derive(Serialize)]
struct ReviewResponse {
    message: String,
    review: Review,
}

fn updated(message: &str, service_request: ServiceRequest) -> HttpResponse {
    HttpResponse::Ok().json(RequestResponse {
        message: message.to_string(),
        service_request,
    })
}

#[post("")]
async fn create_request(
    ctx: Data<AppContext>,
    identity: Identity,
    body: Json<CreateRequestBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let request = ctx.requests.create(&identity, body.service_id, body.remarks).await?;
    Ok(HttpResponse::Created().json(CreatedResponse {
        message: "Service request created successfully".to_string(),
        request_id: request.id,
    }))
}

#[get("")]
async fn list_requests(ctx: Data<AppContext>, identity: Identity) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(ctx.requests.list(&identity).await?))
}

#[get("/available")]
async fn available_requests(ctx: Data<AppContext>, identity: Identity) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(ctx.requests.available(&identity).await?))
}

#[put("/{id}")]
async fn update_request(
    ctx: Data<AppContext>,
    identity: Identity,
    id: Path<i32>,
    body: Json<UpdateRequestBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let close = body.action == Some(CustomerAction::Close);
    let request = ctx
        .requests
        .update(&identity, id.into_inner(), body.remarks, close)
        .await?;
    let message = if close {
        "Service request closed successfully"
    } else {
        "Service request updated successfully"
    };
    Ok(updated(message, request))
}

#[put("/{id}/cancel")]
async fn cancel_request(ctx: Data<AppContext>, identity: Identity, id: Path<i32>) -> Result<HttpResponse, AppError> {
    ctx.requests.cancel(&identity, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Service request cancelled successfully")))
}

#[put("/{id}/action")]
async fn act_on_request(
    ctx: Data<AppContext>,
    identity: Identity,
    id: Path<i32>,
    body: Json<ActionBody>,
) -> Result<HttpResponse, AppError> {
    let request = ctx.requests.act(&identity, id.into_inner(), body.action).await?;
    let message = match body.action {
        WorkerAction::Accept => "Service request accepted successfully",
        WorkerAction::Reject => "Service request rejected successfully",
        WorkerAction::Complete => "Service request completed successfully",
    };
    Ok(updated(message, request))
}

#[put("/{id}/assign")]
async fn assign_request(
    ctx: Data<AppContext>,
    identity: Identity,
    id: Path<i32>,
    body: Json<AssignBody>,
) -> Result<HttpResponse, AppError> {
    let request = ctx
        .requests
        .assign(&identity, id.into_inner(), body.professional_id)
        .await?;
    Ok(updated("Service request assigned successfully", request))
}

#[put("/{id}/status")]
async fn override_status(
    ctx: Data<AppContext>,
    identity: Identity,
    id: Path<i32>,
    body: Json<StatusBody>,
) -> Result<HttpResponse, AppError> {
    let request = ctx
        .requests
        .override_status(&identity, id.into_inner(), body.status)
        .await?;
    Ok(updated("Service request status updated successfully", request))
}

#[post("/{id}/review")]
async fn review_request(
    ctx: Data<AppContext>,
    identity: Identity,
    id: Path<i32>,
    body: Json<ReviewBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let review = ctx
        .reviews
        .add(&identity, id.into_inner(), body.rating, body.comments)
        .await?;
    Ok(HttpResponse::Created().json(ReviewResponse {
        message: "Review added successfully".to_string(),
        review,
    }))
}

pub fn service_requests_config(config: &mut ServiceConfig) {
    config.service(
        scope("/service-requests")
            .service(create_request)
            .service(list_requests)
            .service(available_requests)
            .service(update_request)
            .service(cancel_request)
            .service(act_on_request)
            .service(assign_request)
            .service(override_status)
            .service(review_request),
    );
}
