use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::backend::FetchError;
use crate::encoding::EncodeError;
use crate::eval::EvalError;
use crate::parser::ParseError;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("{0}")]
    NotFound(String),

    #[error("error fetching the data: {0}")]
    Upstream(FetchError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest(_) | ServiceError::Parse(_) => StatusCode::BAD_REQUEST,
            ServiceError::Eval(EvalError::Fetch(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Eval(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Upstream(_) | ServiceError::Encode(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        // Graphite clients expect plain-text error bodies. Encoding failures
        // keep the historical fixed body; the cause only goes to the log.
        let body = match &self {
            ServiceError::Encode(_) => "error marshaling data".to_string(),
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}
