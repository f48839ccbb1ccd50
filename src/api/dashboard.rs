use actix_web::{
    get, put,
    web::{Data, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::Identity;
use crate::error::AppError;
use crate::service::accounts::{Profile, ProfileUpdate};
use crate::service::AppContext;

/// Customers send `address`/`pin_code`, professionals `experience`/`description`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileBody {
    #[validate(length(max = 200, message = "Address must be at most 200 characters"))]
    pub address: Option<String>,
    #[validate(length(max = 10, message = "PIN code must be at most 10 characters"))]
    pub pin_code: Option<String>,
    #[validate(range(min = 0, max = 80, message = "Experience must be between 0 and 80 years"))]
    pub experience: Option<i32>,
    pub description: Option<String>,
}

impl From<ProfileBody> for ProfileUpdate {
    fn from(body: ProfileBody) -> Self {
        ProfileUpdate {
            address: body.address,
            pin_code: body.pin_code,
            experience: body.experience,
            description: body.description,
        }
    }
}

#[derive(Serialize)]
struct ProfileUpdatedResponse {
    message: String,
    profile: Profile,
}

#[get("/dashboard-summary")]
async fn dashboard_summary(ctx: Data<AppContext>, identity: Identity) -> Result<HttpResponse, AppError> {
    let summary = ctx.dashboards.summary(&identity).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[get("/dashboard/stats")]
async fn professional_stats(ctx: Data<AppContext>, identity: Identity) -> Result<HttpResponse, AppError> {
    let stats = ctx.dashboards.professional_stats(&identity).await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[put("/profile")]
async fn update_profile(
    ctx: Data<AppContext>,
    identity: Identity,
    body: Json<ProfileBody>,
) -> Result<HttpResponse, AppError> {
    let profile = ctx
        .accounts
        .update_profile(&identity, body.into_inner().into())
        .await?;
    Ok(HttpResponse::Ok().json(ProfileUpdatedResponse {
        message: "Profile updated successfully".to_string(),
        profile,
    }))
}

pub fn dashboard_config(config: &mut ServiceConfig) {
    config
        .service(dashboard_summary)
        .service(professional_stats)
        .service(update_profile);
}
