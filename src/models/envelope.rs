use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, Result};

/// Response envelope used by every endpoint of the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl<T> ApiEnvelope<T> {
    /// Unwrap `data`, turning `success: false` into a business error.
    ///
    /// Envelopes only arrive in 2xx bodies, so the error reports status 200.
    pub fn into_data(self) -> Result<Option<T>> {
        if self.success {
            return Ok(self.data);
        }
        let payload = json!({"success": false, "message": self.message});
        Err(business_error(200, &payload))
    }
}

/// Detect an envelope that reports failure inside a 2xx response.
pub(crate) fn rejected_envelope(status: u16, body: &Value) -> Option<ApiError> {
    if body.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    Some(business_error(status, body))
}

fn business_error(status: u16, body: &Value) -> ApiError {
    let message = crate::error::server_message(body)
        .unwrap_or_else(|| "Request was not successful".to_string());
    ApiError::Business {
        status,
        message,
        details: Some(body.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Product {
        id: u32,
        name: String,
    }

    #[test]
    fn test_into_data_success() {
        let envelope: ApiEnvelope<Product> = serde_json::from_value(json!({
            "success": true,
            "data": {"id": 7, "name": "Oat milk"}
        }))
        .unwrap();
        let product = envelope.into_data().unwrap().unwrap();
        assert_eq!(product.name, "Oat milk");
    }

    #[test]
    fn test_into_data_failure_carries_message() {
        let envelope: ApiEnvelope<Product> = serde_json::from_value(json!({
            "success": false,
            "message": "Product is archived"
        }))
        .unwrap();
        let err = envelope.into_data().unwrap_err();
        assert_eq!(err.message(), "Product is archived");
        assert_eq!(err.status(), Some(200));
        assert_eq!(
            err.details(),
            Some(&json!({"success": false, "message": "Product is archived"}))
        );
    }

    #[test]
    fn test_into_data_failure_without_message() {
        let envelope: ApiEnvelope<Product> =
            serde_json::from_value(json!({"success": false})).unwrap();
        let err = envelope.into_data().unwrap_err();
        assert!(matches!(err, ApiError::Business { status: 200, .. }));
        assert_eq!(err.message(), "Request was not successful");
    }

    #[test]
    fn test_rejected_envelope_only_on_explicit_false() {
        assert!(rejected_envelope(200, &json!({"data": []})).is_none());
        assert!(rejected_envelope(200, &json!({"success": true})).is_none());
        assert!(rejected_envelope(200, &json!([1, 2, 3])).is_none());

        let err = rejected_envelope(201, &json!({"success": false, "message": "Duplicate"}))
            .unwrap();
        assert_eq!(err.status(), Some(201));
        assert_eq!(err.message(), "Duplicate");
        assert!(err.details().is_some());
    }
}
