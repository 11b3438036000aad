use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use anyhow::Error as ANYHOW_ERROR;
use base64::DecodeError as BASE64_DECODE_ERROR;
use chrono::ParseError as CHRONO_PARSE_ERROR;
use ece::Error as ECE_ERROR;
use jsonwebtoken::errors::Error as JWT_ERROR;
use reqwest::header::{
    InvalidHeaderName as INVALID_HEADER_NAME,
    InvalidHeaderValue as INVALID_HEADER_VALUE,
};
use reqwest::Error as REQWEST_ERROR;
use serde::Serialize;
use serde_json::Error as JSON_ERROR;
use std::{
    io::Error as IO_ERROR, num::ParseIntError,
    str::ParseBoolError as PARSE_BOOL_ERROR,
};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::subscriber::SetGlobalDefaultError as TRACING_GLOBAL_DEFAULT_ERROR;
use url::ParseError as URL_ERROR;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] IO_ERROR),

    #[error("{0}")]
    URL(#[from] URL_ERROR),

    #[error("{0}")]
    INT(#[from] ParseIntError),

    #[error("{0}")]
    TokioJoinError(#[from] JoinError),

    #[error("{0}")]
    Base64DecodeError(#[from] BASE64_DECODE_ERROR),

    #[error("{0}")]
    JsonError(#[from] JSON_ERROR),

    #[error("{0}")]
    ParseBoolError(#[from] PARSE_BOOL_ERROR),

    #[error("{0}")]
    ChronoParseError(#[from] CHRONO_PARSE_ERROR),

    #[error("Tracing error: {0}")]
    SetGlobalDefaultError(#[from] TRACING_GLOBAL_DEFAULT_ERROR),

    #[error("{0}")]
    AnyHowError(#[from] ANYHOW_ERROR),

    #[error("{0}")]
    ReqwestError(#[from] REQWEST_ERROR),

    #[error("{0}")]
    InvalidHeaderName(#[from] INVALID_HEADER_NAME),

    #[error("{0}")]
    InvalidHeaderValue(#[from] INVALID_HEADER_VALUE),

    #[error("{0}")]
    EceError(#[from] ECE_ERROR),

    #[error("{0}")]
    JWT(#[from] JWT_ERROR),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Push is not configured: {0}")]
    ConfigMissing(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Subscription store is corrupt: {0}")]
    StoreCorrupt(String),

    #[error("Subscription store is locked: {0}")]
    StoreLocked(String),

    #[error("Invalid option {option}")]
    InvalidOption { option: String },

    #[error("Server end with error: {0}")]
    ServerError(String),
}

impl Error {
    /// Stable kind string exposed to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ConfigMissing(_) => "ConfigMissing",
            Error::ValidationError(_) => "ValidationError",
            Error::NotFound(_) => "NotFound",
            Error::StoreCorrupt(_) => "StoreCorrupt",
            Error::StoreLocked(_) => "StoreLocked",
            _ => "Internal",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::ValidationError(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        })
    }
}
