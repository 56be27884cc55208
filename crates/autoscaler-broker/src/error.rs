use thiserror::Error;

use autoscaler_state::StateError;

use crate::validation::ValidationErrors;

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The schedule registrar could not be reached or refused the request.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] RegistrarError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scheduler returned {status}: {body}")]
    Status { status: u16, body: String },
}
