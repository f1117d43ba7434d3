use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, FieldViolation, RepositoryError};
use serde::Serialize;
use validator::ValidationErrors;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldViolation>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        let message = violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorBody {
                code: "VALIDATION_ERROR",
                message,
                details: Some(violations),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { violations } => ApiError::validation(violations),
            DomainError::InvalidIdentifier { field, value } => {
                let mut err = ApiError::validation(vec![FieldViolation::new(
                    field,
                    "must be a 24-character hexadecimal identifier",
                )]);
                err.body.code = "INVALID_IDENTIFIER";
                err.body.message = format!("invalid identifier: {value}");
                err
            }
            DomainError::NotFound { resource, .. } => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{resource} not found"),
            ),
            DomainError::Forbidden { action } => {
                ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", action)
            }
            DomainError::Conflict {
                resource,
                field,
                value,
            } => ApiError::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("{resource} with {field} '{value}' already exists"),
            ),
            DomainError::CategoryCycle => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "CATEGORY_CYCLE",
                "a category cannot be its own ancestor",
            ),
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(err) => err.into(),
            ApplicationError::Repository(RepositoryError::NotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "requested resource not found",
            ),
            ApplicationError::Repository(RepositoryError::Conflict { constraint }) => {
                tracing::debug!(constraint = %constraint, "唯一约束冲突");
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
            }
            ApplicationError::Authentication => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_FAILED",
                "authentication failed",
            ),
            ApplicationError::AccountInactive => ApiError::new(
                StatusCode::FORBIDDEN,
                "ACCOUNT_INACTIVE",
                "account is not active",
            ),
            ApplicationError::Authorization => ApiError::new(
                StatusCode::FORBIDDEN,
                "AUTHORIZATION_FAILED",
                "authorization failed",
            ),
            // 存储与哈希的内部细节只写日志
            err @ (ApplicationError::Repository(RepositoryError::Storage { .. })
            | ApplicationError::Password(_)
            | ApplicationError::Infrastructure(_)) => {
                tracing::error!(error = %err, "请求处理失败");
                ApiError::internal_server_error("internal server error")
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut violations: Vec<FieldViolation> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    FieldViolation::new(field.to_string(), message)
                })
            })
            .collect();
        violations.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::validation(violations)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
