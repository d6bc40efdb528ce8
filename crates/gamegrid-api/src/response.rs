//! Response envelope and error → status mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gamegrid_lifecycle::LifecycleError;
use gamegrid_scheduler::SchedulerError;
use gamegrid_state::StateError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::auth::AuthError;

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

/// Anything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Lifecycle(LifecycleError),
    Scheduler(SchedulerError),
    Auth(AuthError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Lifecycle(e) => match e {
                LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
                LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
                LifecycleError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
                LifecycleError::Conflict(_) | LifecycleError::InvalidState { .. } => {
                    StatusCode::CONFLICT
                }
                LifecycleError::ExternalCall(_) => StatusCode::BAD_GATEWAY,
                LifecycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Scheduler(e) => match e {
                SchedulerError::NodeNotFound(_) => StatusCode::NOT_FOUND,
                SchedulerError::InvalidNode(_) => StatusCode::BAD_REQUEST,
                SchedulerError::NoCapacity(_) | SchedulerError::PortRangeExhausted(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                SchedulerError::State(StateError::Conflict(_)) => StatusCode::CONFLICT,
                SchedulerError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(e) => e.status(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Lifecycle(e) => e.to_string(),
            Self::Scheduler(e) => e.to_string(),
            Self::Auth(e) => e.to_string(),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(%status, error = %message, "request failed");
        } else {
            warn!(%status, error = %message, "request rejected");
        }
        error_response(&message, status)
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[cfg(test)]
mod tests {
    use gamegrid_state::ServerStatus;

    use super::*;

    #[test]
    fn lifecycle_errors_map_to_statuses() {
        let cases = [
            (LifecycleError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (LifecycleError::server_not_found("s"), StatusCode::NOT_FOUND),
            (LifecycleError::Capacity("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (LifecycleError::Conflict("x".into()), StatusCode::CONFLICT),
            (LifecycleError::ExternalCall("x".into()), StatusCode::BAD_GATEWAY),
            (
                LifecycleError::InvalidState {
                    server_id: "s".into(),
                    status: ServerStatus::Running,
                    operation: "start",
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn scheduler_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(SchedulerError::InvalidNode("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SchedulerError::NodeNotFound("n".into())).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let json = serde_json::to_value(&ApiResponse::ok(3).0).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 3}));
    }
}
