pub mod client;
pub mod types;

pub use client::SsoApiClient;
pub use types::*;

use serde::{Deserialize, Serialize};

/// Errors from SSO API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Too many requests, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{msg} (code {code})")]
    Api { code: i64, msg: String },

    #[error("Response carried no data")]
    EmptyData,

    #[error("Verification code was sent recently, wait {remaining_secs}s")]
    CoolingDown { remaining_secs: u64 },

    /// Rejected locally, before any request was made.
    #[error("Missing required field: {0}")]
    MissingParameter(&'static str),
}

impl ApiError {
    /// True for 401/403 style failures, where the login center session is gone.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ApiError::Http { status, .. } => *status == 401 || *status == 403,
            ApiError::Api { code, .. } => *code == 401 || *code == 403,
            _ => false,
        }
    }
}

/// Endpoint paths, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPaths {
    pub send_verification: String,
    pub register: String,
    pub login: String,
    pub authorize: String,
    pub user_info: String,
    pub logout: String,
    pub token: String,
    pub refresh_token: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            send_verification: "/auth/send-verification".into(),
            register: "/auth/register".into(),
            login: "/auth/login".into(),
            authorize: "/oauth/authorize".into(),
            user_info: "/auth/me".into(),
            logout: "/auth/logout".into(),
            token: "/oauth/token".into(),
            refresh_token: "/oauth/refresh".into(),
        }
    }
}
