//! One authorization attempt, end to end.
//!
//! ```text
//! IDLE -> PARAMS_GENERATED -> REDIRECTED (params stored)
//!      -> CALLBACK_RECEIVED -> VALIDATED | REJECTED -> IDLE (params cleared)
//! ```
//!
//! `begin` and `handle_callback` are independent calls: nothing is carried in memory
//! between them, everything is read back from the [`PkceStore`].

use crate::api::{ApiError, TokenResponse};
use crate::pkce::{
    self, PkceError, PkceParams, PkceStore, SessionStorage, build_authorization_url,
    parse_callback_url, validate_state,
};
use async_trait::async_trait;
use std::time::Duration;

/// Generic text shown for any rejection that must not reveal its cause.
pub const GENERIC_FAILURE_MESSAGE: &str = "Sign-in failed. Please try again.";

/// Why a callback was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// State differs, is missing from the callback, nothing is stored, or the stored state expired.
    #[error("state mismatch")]
    StateMismatch,

    #[error("authorization server error: {error}")]
    AuthorizationServer {
        error: String,
        description: Option<String>,
    },

    /// Valid state, no error, but no code either.
    #[error("callback carried no authorization code")]
    MissingCode,

    #[error("callback URL could not be parsed")]
    InvalidCallback,

    /// The stored parameters could not be removed, so they cannot be trusted to be single-use.
    #[error("session storage unavailable")]
    StorageUnavailable,
}

impl RejectReason {
    /// Text safe to show the user.
    pub fn user_message(&self) -> String {
        match self {
            RejectReason::AuthorizationServer {
                description: Some(d),
                ..
            } if !d.is_empty() => d.clone(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Result of handling a callback. Either way the stored parameters are gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Validated { code: String, code_verifier: String },
    Rejected(RejectReason),
}

/// Failure of [`AuthorizationFlow::complete`].
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("authorization rejected: {0}")]
    Rejected(RejectReason),

    #[error("token exchange failed: {0}")]
    Exchange(#[from] ApiError),
}

/// Exchanges a validated authorization code for tokens.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ApiError>;
}

/// Drives one PKCE authorization attempt over an injected session storage.
pub struct AuthorizationFlow<S: SessionStorage> {
    store: PkceStore<S>,
    authorize_url: String,
    max_state_age: Option<Duration>,
}

impl<S: SessionStorage> AuthorizationFlow<S> {
    pub fn new(storage: S, authorize_url: impl Into<String>) -> Self {
        Self {
            store: PkceStore::new(storage),
            authorize_url: authorize_url.into(),
            max_state_age: None,
        }
    }

    /// Reject callbacks whose stored state is older than `max_age`. Off by default.
    pub fn with_max_state_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_state_age = max_age;
        self
    }

    pub fn store(&self) -> &PkceStore<S> {
        &self.store
    }

    /// Start an attempt: generate fresh parameters, persist them (replacing any earlier
    /// attempt) and return the URL to navigate to.
    pub fn begin(&self, redirect_uri: &str) -> Result<String, PkceError> {
        let params = pkce::generate_pkce_params()?;
        self.store
            .store(&params)
            .map_err(|e| PkceError::Storage(format!("{:#}", e)))?;
        tracing::debug!("Authorization started, state issued");
        Ok(build_authorization_url(&self.authorize_url, redirect_uri, &params))
    }

    /// Validate a callback URL against the stored parameters.
    ///
    /// Always clears the store before returning. If clearing fails the callback is
    /// rejected, since the same parameters would still be there for a replay.
    pub fn handle_callback(&self, callback_url: &str) -> CallbackOutcome {
        let stored = self.store.load();
        let outcome = if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear stored PKCE parameters: {:#}", e);
            CallbackOutcome::Rejected(RejectReason::StorageUnavailable)
        } else {
            match parse_callback_url(callback_url) {
                Ok(callback) => self.evaluate(stored.as_ref(), callback),
                Err(e) => {
                    tracing::warn!("Unparseable callback URL: {}", e);
                    CallbackOutcome::Rejected(RejectReason::InvalidCallback)
                }
            }
        };

        match &outcome {
            CallbackOutcome::Validated { .. } => tracing::debug!("Callback validated"),
            CallbackOutcome::Rejected(reason) => tracing::warn!("Callback rejected: {}", reason),
        }
        outcome
    }

    fn evaluate(
        &self,
        stored: Option<&PkceParams>,
        callback: pkce::CallbackParams,
    ) -> CallbackOutcome {
        let Some(stored) = stored else {
            return CallbackOutcome::Rejected(RejectReason::StateMismatch);
        };
        // Verifier and challenge must come from the same generation.
        if !stored.verify_challenge() {
            tracing::warn!("Stored code challenge does not match its verifier");
            return CallbackOutcome::Rejected(RejectReason::StateMismatch);
        }
        let state_ok = callback
            .state
            .as_deref()
            .is_some_and(|received| validate_state(received, &stored.state));
        if !state_ok || self.is_expired(stored) {
            return CallbackOutcome::Rejected(RejectReason::StateMismatch);
        }

        if let Some(error) = callback.error {
            return CallbackOutcome::Rejected(RejectReason::AuthorizationServer {
                error,
                description: callback.error_description,
            });
        }

        match callback.code {
            Some(code) if !code.is_empty() => CallbackOutcome::Validated {
                code,
                code_verifier: stored.code_verifier.clone(),
            },
            _ => CallbackOutcome::Rejected(RejectReason::MissingCode),
        }
    }

    fn is_expired(&self, stored: &PkceParams) -> bool {
        let Some(max_age) = self.max_state_age else {
            return false;
        };
        // A state without a readable timestamp cannot be aged, so it cannot pass.
        let Some(issued_ms) = stored.state_issued_at_ms() else {
            return true;
        };
        let age_ms = chrono::Utc::now().timestamp_millis().saturating_sub(issued_ms);
        age_ms < 0 || age_ms as u128 > max_age.as_millis()
    }

    /// Handle the callback and, if validated, exchange the code for tokens.
    pub async fn complete(
        &self,
        callback_url: &str,
        exchanger: &dyn TokenExchanger,
    ) -> Result<TokenResponse, FlowError> {
        match self.handle_callback(callback_url) {
            CallbackOutcome::Validated {
                code,
                code_verifier,
            } => Ok(exchanger.exchange_code(&code, &code_verifier).await?),
            CallbackOutcome::Rejected(reason) => Err(FlowError::Rejected(reason)),
        }
    }
}
