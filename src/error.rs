//! Error taxonomy and HTTP mapping.
//!
//! Every domain error carries a stable machine-readable code alongside its
//! human-readable message; the wire shape is `{message, code}` for client
//! errors and `{message: "Validation Error", errors: [...]}` for request
//! validation failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product \"{title}\" is no longer available")]
    ProductUnavailable { title: String },

    #[error("Insufficient stock for \"{title}\". Only {available} available")]
    InsufficientStock { title: String, available: i32 },

    #[error("Validation Error")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Please verify your email to continue")]
    EmailNotVerified,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Checkout could not be completed, please retry")]
    TransactionFailed,

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmptyCart
            | Self::ProductUnavailable { .. }
            | Self::InsufficientStock { .. }
            | Self::Validation(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::EmailNotVerified => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TransactionFailed | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::EmptyCart => Some("EMPTY_CART"),
            Self::ProductUnavailable { .. } => Some("PRODUCT_UNAVAILABLE"),
            Self::InsufficientStock { .. } => Some("INSUFFICIENT_STOCK"),
            Self::Validation(_) => Some("VALIDATION_ERROR"),
            Self::Unauthorized(_) => Some("UNAUTHORIZED"),
            Self::Forbidden(_) => Some("FORBIDDEN"),
            Self::EmailNotVerified => Some("EMAIL_NOT_VERIFIED"),
            Self::NotFound(_) => Some("NOT_FOUND"),
            Self::TransactionFailed => Some("TRANSACTION_FAILED"),
            Self::BadRequest(_) | Self::Database(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Database(ref e) = self {
            tracing::error!(error = %e, "database error");
            let body = json!({ "message": "An unexpected internal server error occurred." });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }

        let status = self.status();
        let body = match &self {
            Self::Validation(errors) => json!({
                "message": "Validation Error",
                "errors": errors,
            }),
            _ => match self.code() {
                Some(code) => json!({ "message": self.to_string(), "code": code }),
                None => json!({ "message": self.to_string() }),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = Vec::new();
        collect_field_errors("", &errors, &mut fields);
        Self::Validation(fields)
    }
}

// Flattens nested validation errors into dotted field paths
// (e.g. "shippingAddress.street").
fn collect_field_errors(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<FieldError>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for err in errs {
                    out.push(FieldError {
                        field: path.clone(),
                        message: err
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("{} is invalid", path)),
                        value: err.params.get("value").cloned(),
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_field_errors(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_errors(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "street is required"))]
        street: String,
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AppError::EmptyCart.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::InsufficientStock { title: "x".into(), available: 0 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::EmailNotVerified.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("Order").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::TransactionFailed.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn stable_codes() {
        assert_eq!(AppError::EmptyCart.code(), Some("EMPTY_CART"));
        assert_eq!(
            AppError::ProductUnavailable { title: "x".into() }.code(),
            Some("PRODUCT_UNAVAILABLE")
        );
        assert_eq!(AppError::BadRequest("x".into()).code(), None);
    }

    #[test]
    fn validator_errors_map_to_field_errors() {
        let probe = Probe { street: String::new() };
        let err: AppError = probe.validate().unwrap_err().into();
        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "street");
                assert_eq!(fields[0].message, "street is required");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[derive(Validate)]
    struct Outer {
        #[validate]
        address: Probe,
    }

    #[test]
    fn nested_errors_use_dotted_paths() {
        let outer = Outer { address: Probe { street: String::new() } };
        let err: AppError = outer.validate().unwrap_err().into();
        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "address.street");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
