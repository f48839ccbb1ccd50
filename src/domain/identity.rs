use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Role tag carried by every user. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Professional,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Professional => "professional",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "professional" => Ok(Role::Professional),
            "customer" => Ok(Role::Customer),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Admin-controlled gate on whether a professional may act on requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VerificationStatus::Pending),
            "approved" => Ok(VerificationStatus::Approved),
            "rejected" => Ok(VerificationStatus::Rejected),
            other => Err(format!("unknown verification status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: i32,
    pub user_id: i32,
    pub address: String,
    pub pin_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Professional {
    pub id: i32,
    pub user_id: i32,
    pub service_id: i32,
    pub experience: i32,
    pub description: Option<String>,
    pub verification_status: VerificationStatus,
    pub documents: Option<String>,
}

impl Professional {
    pub fn is_approved(&self) -> bool {
        self.verification_status == VerificationStatus::Approved
    }
}

/// Fields shared by every registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub user: NewUser,
    pub address: String,
    pub pin_code: String,
}

#[derive(Debug, Clone)]
pub struct NewProfessional {
    pub user: NewUser,
    pub service_id: i32,
    pub experience: i32,
    pub description: Option<String>,
    pub documents: Option<String>,
}

/// The one canonical identity every authenticated request resolves to,
/// whichever credential carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i32,
    pub username: String,
    pub role: Role,
}

impl Identity {
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{} access required", capitalize(role.as_str()))))
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
