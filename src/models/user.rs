use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_EMAIL_LEN: usize = 255;

/// A user of the system, identified by email and authenticated by API token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    #[serde(skip_serializing)]
    pub api_token: String,
    pub created_at: DateTime<Utc>,
}

/// Validated input for creating a user
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl NewUser {
    /// Regular user; the email is required and gets its domain normalized
    pub fn new(email: &str, name: &str) -> Result<Self> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::validation("User must have an email address."));
        }
        if email.chars().count() > MAX_EMAIL_LEN {
            return Err(Error::validation(format!(
                "Email must be at most {} characters.",
                MAX_EMAIL_LEN
            )));
        }

        Ok(Self {
            email: normalize_email(email),
            name: name.trim().to_string(),
            is_staff: false,
            is_superuser: false,
        })
    }

    /// Staff user with every permission
    pub fn superuser(email: &str, name: &str) -> Result<Self> {
        let mut user = Self::new(email, name)?;
        user.is_staff = true;
        user.is_superuser = true;
        Ok(user)
    }
}

/// Lower-case the domain part of an email, leaving the local part untouched
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Fresh random API token
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
