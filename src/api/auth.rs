use std::path::Path;

use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_session::Session;
use actix_web::{
    get, post,
    web::{scope, Data, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::api::identity::remember;
use crate::api::validation::to_app_error;
use crate::api::MessageResponse;
use crate::domain::{Identity, User};
use crate::error::AppError;
use crate::service::accounts::{CustomerRegistration, Profile, ProfessionalRegistration, Registration};
use crate::service::AppContext;

#[derive(Debug, Deserialize, Validate)]
pub struct CustomerRegisterBody {
    #[validate(length(min = 3, max = 80, message = "Username must be between 3 and 80 characters"))]
    pub username: String,
    #[validate(email(message = "Email address is not valid"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 200, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 3, max = 10, message = "PIN code must be between 3 and 10 characters"))]
    pub pin_code: String,
}

#[derive(MultipartForm)]
pub struct ProfessionalForm {
    pub username: Text<String>,
    pub email: Text<String>,
    pub password: Text<String>,
    pub service_id: Text<i32>,
    pub experience: Text<i32>,
    pub description: Option<Text<String>>,
    pub documents: Option<TempFile>,
}

/// Text half of the professional form, checked like a JSON body.
#[derive(Debug, Validate)]
struct ProfessionalFields {
    #[validate(length(min = 3, max = 80, message = "Username must be between 3 and 80 characters"))]
    username: String,
    #[validate(email(message = "Email address is not valid"))]
    email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
    #[validate(range(min = 0, max = 80, message = "Experience must be between 0 and 80 years"))]
    experience: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginBody {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Serialize)]
struct RegisteredResponse {
    message: String,
    user_id: i32,
}

#[derive(Serialize)]
struct LoginResponse {
    message: String,
    token: String,
    user: User,
}

#[derive(Serialize)]
struct MeResponse {
    identity: Identity,
    profile: Profile,
}

#[post("/register/customer")]
async fn register_customer(ctx: Data<AppContext>, body: Json<CustomerRegisterBody>) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let (user, _) = ctx
        .accounts
        .register_customer(CustomerRegistration {
            account: Registration {
                username: body.username,
                email: body.email,
                password: body.password,
            },
            address: body.address,
            pin_code: body.pin_code,
        })
        .await?;

    Ok(HttpResponse::Created().json(RegisteredResponse {
        message: "Customer registered successfully".to_string(),
        user_id: user.id,
    }))
}

#[post("/register/professional")]
async fn register_professional(
    ctx: Data<AppContext>,
    MultipartForm(form): MultipartForm<ProfessionalForm>,
) -> Result<HttpResponse, AppError> {
    let fields = ProfessionalFields {
        username: form.username.into_inner(),
        email: form.email.into_inner(),
        password: form.password.into_inner(),
        experience: form.experience.into_inner(),
    };
    fields.validate().map_err(to_app_error)?;

    let documents = match form.documents {
        Some(file) => Some(store_document(&ctx.upload_dir, &fields.username, file).await?),
        None => None,
    };

    let registration = ProfessionalRegistration {
        account: Registration {
            username: fields.username,
            email: fields.email,
            password: fields.password,
        },
        service_id: form.service_id.into_inner(),
        experience: fields.experience,
        description: form.description.map(Text::into_inner),
        documents: documents.clone(),
    };

    match ctx.accounts.register_professional(registration).await {
        Ok((user, _)) => Ok(HttpResponse::Created().json(RegisteredResponse {
            message: "Professional registered successfully. Awaiting admin verification".to_string(),
            user_id: user.id,
        })),
        Err(e) => {
            if let Some(stored) = documents {
                if let Err(io) = tokio::fs::remove_file(ctx.upload_dir.join(&stored)).await {
                    warn!("Failed to remove orphaned upload {}: {}", stored, io);
                }
            }
            Err(e)
        }
    }
}

/// Copy an uploaded document into the upload directory under a name that
/// cannot escape it.
async fn store_document(dir: &Path, username: &str, file: TempFile) -> Result<String, AppError> {
    let original = file
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .map(safe_component)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "documents".to_string());
    let stored = format!(
        "{}_{}_{}",
        safe_component(username),
        Utc::now().format("%Y%m%d%H%M%S"),
        original
    );

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Internal(format!("failed to create upload directory: {}", e)))?;
    tokio::fs::copy(file.file.path(), dir.join(&stored))
        .await
        .map_err(|e| AppError::Internal(format!("failed to store upload: {}", e)))?;

    info!("Stored verification documents as {}", stored);
    Ok(stored)
}

fn safe_component(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[post("/login")]
async fn login(ctx: Data<AppContext>, session: Session, body: Json<LoginBody>) -> Result<HttpResponse, AppError> {
    let (user, token) = ctx.auth.login(&body.username, &body.password).await?;
    remember(&session, user.id)?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        message: "Login successful".to_string(),
        token,
        user,
    }))
}

#[post("/logout")]
async fn logout(session: Session) -> HttpResponse {
    session.purge();
    HttpResponse::Ok().json(MessageResponse::new("Logged out successfully"))
}

#[get("/me")]
async fn me(ctx: Data<AppContext>, identity: Identity) -> Result<HttpResponse, AppError> {
    let profile = ctx.accounts.profile(&identity).await?;
    Ok(HttpResponse::Ok().json(MeResponse { identity, profile }))
}

pub fn auth_config(config: &mut ServiceConfig) {
    config.service(
        scope("/auth")
            .service(register_customer)
            .service(register_professional)
            .service(login)
            .service(logout)
            .service(me),
    );
}
