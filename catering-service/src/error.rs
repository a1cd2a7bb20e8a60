use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use diesel_async::pooled_connection::PoolError;
use serde::Serialize;
use shared::{DispatchError, ScheduleError};
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] bb8::RunError<PoolError>),
    #[error("malformed document: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn forbidden() -> Self {
        Self::Forbidden("you are not allowed to perform this action".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(diesel::result::Error::NotFound) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Pool(_) | Self::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::DayNotFound(_) | ScheduleError::ItemNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            ScheduleError::DuplicateItem { .. }
            | ScheduleError::InvalidQuantity
            | ScheduleError::SameDay(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::BranchNotFound(_) | DispatchError::ItemNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            DispatchError::NoItems | DispatchError::NegativeQuantity => {
                Self::BadRequest(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else if matches!(self, Self::Database(diesel::result::Error::NotFound)) {
            "Not found".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let missing: ApiError = ScheduleError::DayNotFound("2024-10-07".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let quantity: ApiError = ScheduleError::InvalidQuantity.into();
        assert_eq!(quantity.status(), StatusCode::BAD_REQUEST);

        let no_items: ApiError = DispatchError::NoItems.into();
        assert_eq!(no_items.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn diesel_not_found_is_a_404() {
        let err = ApiError::from(diesel::result::Error::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn server_errors_hide_details() {
        let err = ApiError::from(diesel::result::Error::RollbackTransaction);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
