use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub mobile_number: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// User shape exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub mobile_number: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            username: user.username,
            email: user.email,
            mobile_number: user.mobile_number,
            created_at: user.created_at,
        }
    }
}

/// Fields for a user row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub mobile_number: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 3, max = 50, message = "must be 3 to 50 characters long"),
        custom(function = validate_username)
    )]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(custom(function = validate_mobile_number))]
    pub mobile_number: String,
    #[validate(custom(function = validate_password))]
    pub password: String,
}

impl RegisterRequest {
    /// Trim and canonicalize fields before validation, the way the API
    /// accepts them: surrounding whitespace is ignored, emails are
    /// case-insensitive, and mobile numbers may carry separators.
    pub fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        self.mobile_number = self
            .mobile_number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username, email, or mobile number.
    #[validate(custom(function = validate_not_blank))]
    pub identifier: String,
    #[validate(custom(function = validate_not_blank))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid(
            "username_charset",
            "may only contain letters, numbers, and underscores",
        ));
    }
    if username.starts_with('_') || username.ends_with('_') {
        return Err(invalid(
            "username_underscore",
            "cannot start or end with an underscore",
        ));
    }
    Ok(())
}

fn validate_mobile_number(mobile_number: &str) -> Result<(), ValidationError> {
    let digits = mobile_number.strip_prefix('+').unwrap_or(mobile_number);
    let well_formed = (10..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');
    if !well_formed {
        return Err(invalid(
            "mobile_number_format",
            "must be 10 to 15 digits, optionally prefixed with +",
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < 8 {
        return Err(invalid(
            "password_length",
            "must be at least 8 characters long",
        ));
    }
    if !password.is_ascii() {
        return Err(invalid(
            "password_ascii",
            "may only contain ASCII letters, numbers, and special characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid(
            "password_uppercase",
            "must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(invalid(
            "password_lowercase",
            "must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid(
            "password_digit",
            "must contain at least one number",
        ));
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err(invalid(
            "password_special",
            "must contain at least one special character",
        ));
    }
    Ok(())
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid("blank", "cannot be empty"));
    }
    Ok(())
}
