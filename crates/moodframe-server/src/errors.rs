use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use moodframe_contracts::api::ErrorBody;
use moodframe_engine::Error as EngineError;

use crate::reporting::ErrorReport;

pub const INVALID_REQUEST_CODE: &str = "InvalidRequest";
const NO_IMAGE_LABEL: &str = "No image returned by model";
const TOO_LARGE_CODE: &str = "PayloadTooLarge";
const TOO_LARGE_LABEL: &str = "Request body too large";

/// Handler failure, already shaped as the JSON body the client receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn invalid_request(label: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: label.into(),
                code: INVALID_REQUEST_CODE.to_string(),
                details,
            },
        }
    }

    /// Body extraction failure. Anything over the body limit becomes 413;
    /// every other rejection keeps the endpoint's 400 label.
    pub fn unreadable_body(label: &str, status: StatusCode, details: String) -> Self {
        if status != StatusCode::PAYLOAD_TOO_LARGE {
            return Self::invalid_request(label, Some(details));
        }
        Self {
            status,
            body: ErrorBody {
                error: TOO_LARGE_LABEL.to_string(),
                code: TOO_LARGE_CODE.to_string(),
                details: Some(details),
            },
        }
    }

    /// Maps an engine failure onto the endpoint's failure label.
    pub fn from_engine(label: &str, err: &EngineError) -> Self {
        let status = if err.is_invalid_request() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let label = match err {
            EngineError::NoImageReturned { .. } => NO_IMAGE_LABEL,
            _ => label,
        };
        Self {
            status,
            body: ErrorBody {
                error: label.to_string(),
                code: err.code().to_string(),
                details: Some(format!("{err:#}")),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }

    pub fn report(&self, endpoint: &'static str) -> ErrorReport {
        ErrorReport {
            endpoint,
            status: self.status.as_u16(),
            code: self.body.code.clone(),
            label: self.body.error.clone(),
            details: self.body.details.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
