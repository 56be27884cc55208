use std::time::Duration;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A policy, schedule or instance-count lookup failed; the cycle is skipped.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("scale dispatch failed: {0}")]
    Dispatch(String),

    #[error("scale dispatch timed out after {0:?}")]
    Timeout(Duration),
}
