//! Standard response envelope: `{success, message?, data?, error?}`.

use crate::error::WardenError;
use serde::{Deserialize, Serialize};

/// Error payload carried in a failed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(data)
        }
    }
}

impl ApiEnvelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    pub fn from_error(err: &WardenError) -> Self {
        let field = match err {
            WardenError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        Self {
            success: false,
            message: Some(err.public_message()),
            data: None,
            error: Some(ErrorBody {
                code: err.error_code().to_string(),
                field,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_omits_error() {
        let json = serde_json::to_value(ApiEnvelope::ok(5)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 5}));
    }

    #[test]
    fn test_error_envelope_carries_code_and_field() {
        let env = ApiEnvelope::from_error(&WardenError::validation("email", "Invalid email format"));
        let json = serde_json::to_value(env).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "validation_error");
        assert_eq!(json["error"]["field"], "email");
        assert!(json.get("data").is_none());
    }
}
