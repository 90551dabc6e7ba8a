//! API error mapping.
//!
//! Engine errors map to statuses by category: listing 404, bounds and
//! ledger refusals 409, domain and invariant 422, configuration 400.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use super::types::ErrorBody;
use crate::domain::error::EngineError;

#[derive(Debug)]
pub enum ApiError {
  Engine(EngineError),
  BadRequest(String),
  RateLimited,
  Internal(anyhow::Error),
}

impl From<EngineError> for ApiError {
  fn from(e: EngineError) -> Self {
    Self::Engine(e)
  }
}

impl From<anyhow::Error> for ApiError {
  fn from(e: anyhow::Error) -> Self {
    Self::Internal(e)
  }
}

impl ApiError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      Self::Engine(e) => match e.category() {
        "listing" => StatusCode::NOT_FOUND,
        "bounds" | "ledger" => StatusCode::CONFLICT,
        "domain" | "invariant" => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
      },
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn body(&self) -> ErrorBody {
    let (error, message) = match self {
      Self::Engine(e) => (e.category().to_string(), e.to_string()),
      Self::BadRequest(m) => ("bad_request".to_string(), m.clone()),
      Self::RateLimited => (
        "rate_limited".to_string(),
        "too many trade submissions".to_string(),
      ),
      Self::Internal(_) => ("internal".to_string(), "internal error".to_string()),
    };
    ErrorBody { error, message }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if let Self::Internal(e) = &self {
      error!(error = %format!("{e:#}"), "Request failed");
    }
    (self.status_code(), Json(self.body())).into_response()
  }
}
