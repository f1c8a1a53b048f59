//! API error handling for the governance surface

use crate::error::GovernanceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// JSON error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    pub timestamp: u64,
}

impl ApiError {
    pub fn new(code: u16, message: String) -> Self {
        Self {
            code,
            message,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(400, message.to_string())
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(404, message.to_string())
    }

    pub fn internal_server_error(message: &str) -> Self {
        Self::new(500, message.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API Error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<GovernanceError> for ApiError {
    fn from(err: GovernanceError) -> Self {
        let code = match &err {
            GovernanceError::Unauthorized(_) => 403,
            GovernanceError::InsufficientBalance { .. }
            | GovernanceError::SupplyCapExceeded { .. }
            | GovernanceError::ThresholdNotMet { .. }
            | GovernanceError::InvalidAddress(_) => 400,
            GovernanceError::DuplicateRegistration { .. }
            | GovernanceError::DuplicateDeployment(_)
            | GovernanceError::AlreadyVoted { .. }
            | GovernanceError::AlreadyClaimed(_)
            | GovernanceError::VotingClosed(_)
            | GovernanceError::InvalidProposalState { .. }
            | GovernanceError::TimelockActive { .. } => 409,
            GovernanceError::UnknownModel(_)
            | GovernanceError::ProposalNotFound(_)
            | GovernanceError::AgentNotFound { .. }
            | GovernanceError::DaoNotDeployed(_) => 404,
            GovernanceError::PaymentAuthorizationFailed(_) => 402,
            GovernanceError::InvalidParameter(_) => 422,
            GovernanceError::IntegrityFault(_) | GovernanceError::Internal(_) => 500,
        };
        Self::new(code, err.to_string())
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err: ApiError = GovernanceError::UnknownModel("davinci".to_string()).into();
        assert_eq!(err.code, 404);

        let err: ApiError = GovernanceError::PaymentAuthorizationFailed("spent".to_string()).into();
        assert_eq!(err.code, 402);

        let err: ApiError = GovernanceError::AlreadyVoted {
            proposal_id: 1,
            voter: "0x".to_string(),
        }
        .into();
        assert_eq!(err.code, 409);
    }
}
