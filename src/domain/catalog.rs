use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A category of household work with a fixed price and duration.
#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub base_price: f64,
    /// Minutes
    pub time_required: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServiceInput {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Base price must not be negative"))]
    pub base_price: f64,
    #[validate(range(min = 1, message = "Time required must be at least one minute"))]
    pub time_required: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
