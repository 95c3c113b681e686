// src/utils/errors.rs

use std::{error::Error, fmt};
use reqwest;
use serde_json;
use thiserror::Error as ThisError;

use crate::services::fvg::{Timeframe, ValueAreaError};

/// Errors coming from external I/O (HTTP, JSON, Redis, DB, disk).
#[derive(Debug)]
pub enum ApiError {
    Http(reqwest::Error),
    Json(serde_json::Error),
    Redis(redis::RedisError),
    Database(sqlx::Error),
    Io(std::io::Error),
    /// HTTP 429 / 418 from the exchange.
    RateLimited(String),
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(e)        => write!(f, "HTTP error: {}", e),
            ApiError::Json(e)        => write!(f, "JSON error: {}", e),
            ApiError::Redis(e)       => write!(f, "Redis error: {}", e),
            ApiError::Database(e)    => write!(f, "Database error: {}", e),
            ApiError::Io(e)          => write!(f, "I/O error: {}", e),
            ApiError::RateLimited(m) => write!(f, "rate limited: {}", m),
            ApiError::Other(msg)     => write!(f, "{}", msg),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::Http(e)     => Some(e),
            ApiError::Json(e)     => Some(e),
            ApiError::Redis(e)    => Some(e),
            ApiError::Database(e) => Some(e),
            ApiError::Io(e)       => Some(e),
            ApiError::RateLimited(_) | ApiError::Other(_) => None,
        }
    }
}

// Conversions from underlying errors into ApiError
impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self { ApiError::Http(err) }
}
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self { ApiError::Database(err) }
}
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self { ApiError::Json(err) }
}
impl From<redis::RedisError> for ApiError {
    fn from(err: redis::RedisError) -> Self { ApiError::Redis(err) }
}
impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self { ApiError::Io(err) }
}

/// Per-symbol pipeline failures. None of them stops a batch.
#[derive(Debug, ThisError)]
pub enum ScreenError {
    #[error("{symbol} {timeframe}: no usable data ({reason})")]
    DataUnavailable {
        symbol: String,
        timeframe: Timeframe,
        reason: String,
    },

    #[error("value area: {0}")]
    ComputationDegenerate(#[from] ValueAreaError),

    #[error("{symbol}: {source}")]
    ExternalFailure {
        symbol: String,
        #[source]
        source: ApiError,
    },
}

impl ScreenError {
    pub fn external(symbol: &str, source: ApiError) -> Self {
        ScreenError::ExternalFailure { symbol: symbol.to_string(), source }
    }

    pub fn unavailable(symbol: &str, timeframe: Timeframe, reason: impl Into<String>) -> Self {
        ScreenError::DataUnavailable {
            symbol: symbol.to_string(),
            timeframe,
            reason: reason.into(),
        }
    }

    /// Local recoveries log at `warn`, upstream failures at `error`.
    pub fn log_level(&self) -> log::Level {
        match self {
            ScreenError::ExternalFailure { .. } => log::Level::Error,
            _ => log::Level::Warn,
        }
    }
}
