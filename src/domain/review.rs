use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::AppError;

/// Star rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn new(value: i64) -> Result<Self, AppError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(AppError::Validation(format!(
                "Rating must be between {} and {}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: i32,
    pub service_request_id: i32,
    pub rating: Rating,
    pub comments: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub service_request_id: i32,
    pub rating: Rating,
    pub comments: Option<String>,
    pub created_at: NaiveDateTime,
}
