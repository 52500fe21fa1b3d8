//! Login center session: passwordless email login, registration and code issuance.

use crate::api::{
    ApiError, AuthorizeRequest, LoginRequest, RegisterRequest, RegisterResponse,
    SendVerificationRequest, SendVerificationResponse, SsoApiClient, UserInfo, VerificationPurpose,
};
use crate::pkce::build_callback_url;
use std::time::{Duration, Instant};

/// Who is signed in to the login center, if anyone.
#[derive(Debug, Clone, Default)]
pub struct UserSession {
    user: Option<UserInfo>,
}

impl UserSession {
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    pub fn display_name(&self) -> &str {
        self.user.as_ref().map(|u| u.display_name()).unwrap_or("")
    }

    pub fn email(&self) -> &str {
        self.user.as_ref().map(|u| u.email.as_str()).unwrap_or("")
    }

    pub fn set_user(&mut self, user: UserInfo) {
        self.user = Some(user);
    }

    pub fn clear(&mut self) {
        self.user = None;
    }

    /// Apply `f` to the current user; no-op when logged out.
    pub fn update(&mut self, f: impl FnOnce(&mut UserInfo)) {
        if let Some(user) = self.user.as_mut() {
            f(user);
        }
    }
}

/// Login center operations plus the local state they drive.
pub struct AuthService {
    api: SsoApiClient,
    session: UserSession,
    default_cooldown: Duration,
    cooldown_until: Option<Instant>,
}

impl AuthService {
    pub fn new(api: SsoApiClient, default_cooldown: Duration) -> Self {
        Self {
            api,
            session: UserSession::default(),
            default_cooldown,
            cooldown_until: None,
        }
    }

    pub fn session(&self) -> &UserSession {
        &self.session
    }

    /// Seconds until another verification code may be requested.
    pub fn cooldown_remaining(&self) -> u64 {
        self.cooldown_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0))
            .unwrap_or(0)
    }

    fn start_cooldown(&mut self, secs: Option<u64>) {
        let duration = secs.map(Duration::from_secs).unwrap_or(self.default_cooldown);
        self.cooldown_until = Some(Instant::now() + duration);
    }

    pub async fn send_verification_code(
        &mut self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> Result<SendVerificationResponse, ApiError> {
        let remaining_secs = self.cooldown_remaining();
        if remaining_secs > 0 {
            return Err(ApiError::CoolingDown { remaining_secs });
        }

        let req = SendVerificationRequest {
            email: email.to_string(),
            purpose,
        };
        match self.api.send_verification_code(&req).await {
            Ok(resp) => {
                self.start_cooldown(resp.cooldown_seconds);
                tracing::info!("Verification code sent to {}", email);
                Ok(resp)
            }
            Err(ApiError::RateLimited { retry_after_secs }) => {
                self.start_cooldown(retry_after_secs);
                Err(ApiError::RateLimited { retry_after_secs })
            }
            Err(e) => Err(e),
        }
    }

    /// Create an account. The user still has to log in afterwards.
    pub async fn register(
        &self,
        email: &str,
        verification_code: &str,
        name: Option<&str>,
    ) -> Result<RegisterResponse, ApiError> {
        let req = RegisterRequest {
            email: email.to_string(),
            verification_code: verification_code.to_string(),
            name: name.map(str::to_string).filter(|n| !n.trim().is_empty()),
        };
        let resp = self.api.register(&req).await?;
        tracing::info!("Registered account {} for {}", resp.id, email);
        Ok(resp)
    }

    /// Log in with an emailed code, then load the user profile.
    pub async fn login(&mut self, email: &str, code: &str) -> Result<&UserInfo, ApiError> {
        let req = LoginRequest {
            email: email.to_string(),
            code: code.to_string(),
        };
        let resp = self.api.login(&req).await?;
        tracing::debug!("Logged in as user {}", resp.user_id);
        self.fetch_user_info().await?;
        self.session.user().ok_or(ApiError::EmptyData)
    }

    /// Refresh the profile; any failure logs the local session out.
    pub async fn fetch_user_info(&mut self) -> Result<(), ApiError> {
        match self.api.get_user_info().await {
            Ok(user) => {
                self.session.set_user(user);
                Ok(())
            }
            Err(e) if e.is_unauthorized() => {
                tracing::info!("Login center session expired, clearing session");
                self.session.clear();
                Err(e)
            }
            Err(e) => {
                tracing::warn!("Fetching user info failed, clearing session: {}", e);
                self.session.clear();
                Err(e)
            }
        }
    }

    /// Re-validate a session that was believed to be logged in.
    pub async fn init_user_info(&mut self) -> Result<(), ApiError> {
        if self.session.is_logged_in() {
            self.fetch_user_info().await?;
        }
        Ok(())
    }

    /// Issue a code for a client's authorization request; returns the client redirect URL.
    pub async fn authorize(&self, req: &AuthorizeRequest) -> Result<String, ApiError> {
        if req.redirect_uri.is_empty() {
            return Err(ApiError::MissingParameter("redirect_uri"));
        }
        if req.code_challenge.is_empty() {
            return Err(ApiError::MissingParameter("code_challenge"));
        }
        let body = AuthorizeRequest {
            state: Some(req.state.clone().unwrap_or_default()),
            ..req.clone()
        };
        let resp = self.api.authorize(&body).await?;
        Ok(build_callback_url(&req.redirect_uri, &resp.code, &resp.state))
    }

    /// End the login center session. Local state is cleared even if the call fails.
    pub async fn logout(&mut self) -> Result<(), ApiError> {
        let result = self.api.logout_center().await;
        self.session.clear();
        match result {
            Ok(msg) => {
                tracing::debug!("Logged out: {}", msg);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Logout call failed: {}", e);
                Err(e)
            }
        }
    }
}
