//! Mapping of routing errors onto admin API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::RoutingError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub RoutingError);

impl From<RoutingError> for ApiError {
    fn from(err: RoutingError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            RoutingError::NotFound { .. } => StatusCode::NOT_FOUND,
            RoutingError::AlreadyExists { .. }
            | RoutingError::RouterOnline(_)
            | RoutingError::ServiceInUse(_)
            | RoutingError::AlreadyOnline(_) => StatusCode::CONFLICT,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.0.code(),
            kind: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
