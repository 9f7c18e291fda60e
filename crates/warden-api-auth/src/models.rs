//! Request and response bodies for the authentication endpoints.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};
use warden_db::models::{Department, Region, UserProfile};

use crate::error::ApiAuthError;

/// Registration payload. Also the item type of a bulk registration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "confirm_matches_register"))]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 255, message = "Email too long"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    /// When present, must equal `password`.
    #[serde(default)]
    pub confirm_password: Option<String>,

    pub department: Department,

    pub region: Region,

    #[serde(default = "default_level")]
    #[validate(range(min = 1, max = 10, message = "Level must be between 1 and 10"))]
    pub level: i16,

    /// Role name to assign instead of the configured default.
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub custom_attributes: Option<serde_json::Value>,
}

fn default_level() -> i16 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Upper bound keeps hashing cost bounded.
    #[validate(length(min = 1, max = 1024, message = "Password must be 1-1024 characters"))]
    pub password: String,
}

/// Refresh and logout bodies. The token may come from the cookie instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "confirm_matches_change"))]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 1024, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub new_password: String,

    #[serde(default)]
    pub confirm_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRegisterRequest {
    pub users: Vec<RegisterRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserProfile,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub index: usize,
    pub email: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkRegisterResult {
    pub successful: Vec<UserProfile>,
    pub failed: Vec<BulkFailure>,
}

fn confirm_matches(password: &str, confirm: Option<&str>) -> Result<(), ValidationError> {
    match confirm {
        Some(confirm) if confirm != password => {
            let mut err = ValidationError::new("confirm_password");
            err.message = Some("Passwords do not match".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

fn confirm_matches_register(req: &RegisterRequest) -> Result<(), ValidationError> {
    confirm_matches(&req.password, req.confirm_password.as_deref())
}

fn confirm_matches_change(req: &ChangePasswordRequest) -> Result<(), ValidationError> {
    confirm_matches(&req.new_password, req.confirm_password.as_deref())
}

/// Validate `req`, reporting the first failing field (alphabetically, for stable output).
pub fn validate_request<T: Validate>(req: &T) -> Result<(), ApiAuthError> {
    req.validate().map_err(first_error)
}

fn first_error(errors: ValidationErrors) -> ApiAuthError {
    let mut fields: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            let err = errs.first()?;
            let field = if field == "__all__" {
                err.code.to_string()
            } else {
                field.to_string()
            };
            let message = err
                .message
                .as_ref()
                .map_or_else(|| format!("Invalid {field}"), ToString::to_string);
            Some((field, message))
        })
        .collect();
    fields.sort();

    match fields.into_iter().next() {
        Some((field, message)) => ApiAuthError::Validation { field, message },
        None => ApiAuthError::validation("body", "Invalid request"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(password: &str, confirm: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            name: "Grace Hopper".into(),
            email: "grace@example.com".into(),
            password: password.into(),
            confirm_password: confirm.map(String::from),
            department: Department::Engineering,
            region: Region::West,
            level: 3,
            role: None,
            custom_attributes: None,
        }
    }

    #[test]
    fn test_confirm_password_is_enforced() {
        assert!(validate_request(&register("Str0ng!Pass", Some("Str0ng!Pass"))).is_ok());
        assert!(validate_request(&register("Str0ng!Pass", None)).is_ok());

        let err = validate_request(&register("Str0ng!Pass", Some("different"))).unwrap_err();
        match err {
            ApiAuthError::Validation { field, message } => {
                assert_eq!(field, "confirm_password");
                assert_eq!(message, "Passwords do not match");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_email_and_level_are_checked() {
        let mut req = register("Str0ng!Pass", None);
        req.email = "not-an-email".into();
        assert!(matches!(
            validate_request(&req),
            Err(ApiAuthError::Validation { ref field, .. }) if field == "email"
        ));

        let mut req = register("Str0ng!Pass", None);
        req.level = 0;
        assert!(matches!(
            validate_request(&req),
            Err(ApiAuthError::Validation { ref field, .. }) if field == "level"
        ));
    }

    #[test]
    fn test_level_defaults_to_one() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "name": "Ann",
            "email": "ann@example.com",
            "password": "Str0ng!Pass",
            "department": "HR",
            "region": "SOUTH"
        }))
        .unwrap();
        assert_eq!(req.level, 1);
        assert_eq!(req.department, Department::Hr);
    }
}
