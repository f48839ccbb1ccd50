use actix_web::{
    delete, get, post, put,
    web::{scope, Data, Path, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::MessageResponse;
use crate::domain::{Identity, Professional, Service, ServiceInput, User, VerificationStatus};
use crate::error::AppError;
use crate::service::AppContext;

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyBody {
    pub status: VerificationStatus,
}

#[derive(Serialize)]
struct UserResponse {
    message: String,
    user: User,
}

#[derive(Serialize)]
struct ProfessionalResponse {
    message: String,
    professional: Professional,
}

#[derive(Serialize)]
struct ServiceResponse {
    message: String,
    service: Service,
}

#[get("/users")]
async fn list_users(ctx: Data<AppContext>, identity: Identity) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(ctx.accounts.list_users(&identity).await?))
}

#[put("/users/{id}/toggle-status")]
async fn toggle_user_status(
    ctx: Data<AppContext>,
    identity: Identity,
    id: Path<i32>,
) -> Result<HttpResponse, AppError> {
    let user = ctx.accounts.toggle_user_status(&identity, id.into_inner()).await?;
    let message = if user.is_active {
        "User activated successfully"
    } else {
        "User blocked successfully"
    };
    Ok(HttpResponse::Ok().json(UserResponse {
        message: message.to_string(),
        user,
    }))
}

#[get("/professionals")]
async fn list_professionals(ctx: Data<AppContext>, identity: Identity) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(ctx.accounts.list_professionals(&identity).await?))
}

#[put("/professionals/{id}/verify")]
async fn verify_professional(
    ctx: Data<AppContext>,
    identity: Identity,
    id: Path<i32>,
    body: Json<VerifyBody>,
) -> Result<HttpResponse, AppError> {
    let professional = ctx
        .accounts
        .verify_professional(&identity, id.into_inner(), body.status)
        .await?;
    Ok(HttpResponse::Ok().json(ProfessionalResponse {
        message: format!("Professional {}", professional.verification_status.as_str()),
        professional,
    }))
}

#[post("/services")]
async fn create_service(
    ctx: Data<AppContext>,
    identity: Identity,
    body: Json<ServiceInput>,
) -> Result<HttpResponse, AppError> {
    let service = ctx.catalog.create(&identity, &body).await?;
    Ok(HttpResponse::Created().json(ServiceResponse {
        message: "Service created successfully".to_string(),
        service,
    }))
}

#[put("/services/{id}")]
async fn update_service(
    ctx: Data<AppContext>,
    identity: Identity,
    id: Path<i32>,
    body: Json<ServiceInput>,
) -> Result<HttpResponse, AppError> {
    let service = ctx.catalog.update(&identity, id.into_inner(), &body).await?;
    Ok(HttpResponse::Ok().json(ServiceResponse {
        message: "Service updated successfully".to_string(),
        service,
    }))
}

#[delete("/services/{id}")]
async fn delete_service(ctx: Data<AppContext>, identity: Identity, id: Path<i32>) -> Result<HttpResponse, AppError> {
    ctx.catalog.delete(&identity, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Service deleted successfully")))
}

pub fn admin_config(config: &mut ServiceConfig) {
    config.service(
        scope("/admin")
            .service(list_users)
            .service(toggle_user_status)
            .service(list_professionals)
            .service(verify_professional)
            .service(create_service)
            .service(update_service)
            .service(delete_service),
    );
}
