use actix_web::{error::InternalError, HttpResponse};
use serde::Serialize;

use crate::error::AppError;

/// Body of every error response.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

fn bad_request(error: &str, fields: serde_json::Map<String, serde_json::Value>) -> actix_web::Error {
    let body = ErrorResponse {
        error: error.to_string(),
        fields: serde_json::Value::Object(fields),
    };
    InternalError::from_response("", HttpResponse::BadRequest().json(body)).into()
}

/// Message for a body that failed to deserialize.
fn describe_deserialize_error(err: &str) -> String {
    if err.contains("EOF while parsing") {
        "Request body is empty. Expected JSON payload".to_string()
    } else if err.contains("unknown variant") {
        "Invalid enum value. Check allowed values for this field".to_string()
    } else if let Some(rest) = err.split("missing field `").nth(1) {
        let field = rest.split('`').next().unwrap_or_default();
        format!("Missing required field: {}", field)
    } else {
        "Invalid JSON format".to_string()
    }
}

/// Creates a configured JsonConfig with standardized error handling for the entire project
pub fn json_config() -> actix_web_validator::JsonConfig {
    actix_web_validator::JsonConfig::default().error_handler(|err, _req| {
        let mut fields = serde_json::Map::new();

        match err {
            actix_web_validator::Error::Validate(validation_errors) => {
                for (field, errors) in validation_errors.field_errors() {
                    let messages: Vec<String> = errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| format!("Validation error in field: {}", field))
                        })
                        .collect();
                    fields.insert(field.to_string(), serde_json::json!({ "errors": messages }));
                }
                bad_request("Validation failed", fields)
            }
            actix_web_validator::Error::Deserialize(de_err) => {
                fields.insert(
                    "message".to_string(),
                    serde_json::json!(describe_deserialize_error(&de_err.to_string())),
                );
                bad_request("Request validation failed", fields)
            }
            _ => {
                fields.insert("message".to_string(), serde_json::json!("Validation error"));
                bad_request("Validation failed", fields)
            }
        }
    })
}

/// Collapse `validator` errors into one [`AppError::Validation`], for inputs
/// that do not arrive through the JSON extractor.
pub fn to_app_error(errors: validator::ValidationErrors) -> AppError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Validation error in field: {}", field))
            })
        })
        .collect();
    messages.sort();
    AppError::Validation(messages.join("; "))
}
