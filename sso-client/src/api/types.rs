//! Request and response bodies of the SSO HTTP API, with on-the-wire field names.

use serde::{Deserialize, Serialize};

/// Uniform response wrapper: `{ code, msg, data }`. `code == 200` means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub const SUCCESS: i64 = 200;

    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationPurpose {
    Login,
    Register,
}

impl std::str::FromStr for VerificationPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Self::Login),
            "register" => Ok(Self::Register),
            other => Err(format!("unknown purpose: {} (expected login or register)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendVerificationRequest {
    pub email: String,
    pub purpose: VerificationPurpose,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub verification_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: i64,
}

/// Body of the login center's authorize call, and the query of an incoming authorization URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub redirect_uri: String,
    pub code_challenge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UserInfo {
    /// Name if set, otherwise the email.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub code: String,
    pub code_verifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_null_data() {
        let env: ApiEnvelope<LoginResponse> =
            serde_json::from_str(r#"{"code":401,"msg":"bad code","data":null}"#).unwrap();
        assert!(!env.is_success());
        assert!(env.data.is_none());
        assert_eq!(env.msg, "bad code");
    }

    #[test]
    fn register_request_uses_camel_case() {
        let body = serde_json::to_value(RegisterRequest {
            email: "a@b.c".into(),
            verification_code: "123456".into(),
            name: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"email": "a@b.c", "verificationCode": "123456"}));
    }

    #[test]
    fn user_info_display_name_falls_back_to_email() {
        let mut user: UserInfo = serde_json::from_str(
            r#"{"id":7,"email":"a@b.c","name":"","createdAt":"2025-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(user.display_name(), "a@b.c");
        user.name = Some("Ada".into());
        assert_eq!(user.display_name(), "Ada");
        assert!(user.created_at.is_some());
    }

    #[test]
    fn purpose_parses_and_serializes_lowercase() {
        let p: VerificationPurpose = "register".parse().unwrap();
        assert_eq!(serde_json::to_value(p).unwrap(), "register");
        assert!("signup".parse::<VerificationPurpose>().is_err());
    }
}
