use super::types::*;
use super::{ApiError, ApiPaths};
use crate::flow::TokenExchanger;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client for the SSO login center.
///
/// Keeps a cookie store, so a `login` followed by `authorize` or `get_user_info`
/// on the same client shares the login center session.
#[derive(Clone)]
pub struct SsoApiClient {
    http: reqwest::Client,
    base_url: String,
    paths: ApiPaths,
}

impl SsoApiClient {
    pub fn new(base_url: &str, paths: ApiPaths, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            paths,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiEnvelope<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let mut req = self
            .http
            .request(method, &url)
            .header("Accept", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(ApiError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Unwrap an envelope that must carry data.
    fn into_data<T>(env: ApiEnvelope<T>) -> Result<T, ApiError> {
        if !env.is_success() {
            return Err(ApiError::Api {
                code: env.code,
                msg: env.msg,
            });
        }
        env.data.ok_or(ApiError::EmptyData)
    }

    /// Unwrap an envelope whose data may be null; returns the message.
    fn into_message<T>(env: ApiEnvelope<T>) -> Result<String, ApiError> {
        if !env.is_success() {
            return Err(ApiError::Api {
                code: env.code,
                msg: env.msg,
            });
        }
        Ok(env.msg)
    }

    /// Ask the login center to email a one-time code.
    pub async fn send_verification_code(
        &self,
        req: &SendVerificationRequest,
    ) -> Result<SendVerificationResponse, ApiError> {
        let env: ApiEnvelope<SendVerificationResponse> = self
            .request(Method::POST, &self.paths.send_verification, Some(req))
            .await?;
        if !env.is_success() {
            return Err(ApiError::Api {
                code: env.code,
                msg: env.msg,
            });
        }
        let mut data = env.data.unwrap_or_default();
        if data.message.is_empty() {
            data.message = env.msg;
        }
        Ok(data)
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        let env = self
            .request(Method::POST, &self.paths.register, Some(req))
            .await?;
        Self::into_data(env)
    }

    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let env = self.request(Method::POST, &self.paths.login, Some(req)).await?;
        Self::into_data(env)
    }

    /// Issue an authorization code bound to `req.code_challenge`. Requires a logged-in session.
    pub async fn authorize(&self, req: &AuthorizeRequest) -> Result<AuthorizeResponse, ApiError> {
        let env = self
            .request(Method::POST, &self.paths.authorize, Some(req))
            .await?;
        Self::into_data(env)
    }

    pub async fn get_user_info(&self) -> Result<UserInfo, ApiError> {
        let env = self
            .request::<(), _>(Method::GET, &self.paths.user_info, None)
            .await?;
        Self::into_data(env)
    }

    /// End the login center session.
    pub async fn logout_center(&self) -> Result<String, ApiError> {
        let env = self
            .request::<(), serde_json::Value>(Method::POST, &self.paths.logout, None)
            .await?;
        Self::into_message(env)
    }

    /// Trade an authorization code plus its verifier for tokens.
    pub async fn exchange_token(&self, req: &TokenRequest) -> Result<TokenResponse, ApiError> {
        let env = self.request(Method::POST, &self.paths.token, Some(req)).await?;
        Self::into_data(env)
    }

    pub async fn refresh_token(
        &self,
        req: &RefreshTokenRequest,
    ) -> Result<TokenResponse, ApiError> {
        let env = self
            .request(Method::POST, &self.paths.refresh_token, Some(req))
            .await?;
        Self::into_data(env)
    }
}

#[async_trait]
impl TokenExchanger for SsoApiClient {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ApiError> {
        self.exchange_token(&TokenRequest {
            code: code.to_string(),
            code_verifier: code_verifier.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> SsoApiClient {
        SsoApiClient::new(&server.uri(), ApiPaths::default(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn login_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "a@b.c", "code": "123456"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "msg": "ok", "data": {"userId": 42}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let resp = client
            .login(&LoginRequest {
                email: "a@b.c".into(),
                code: "123456".into(),
            })
            .await
            .unwrap();
        assert_eq!(resp.user_id, 42);
    }

    #[tokio::test]
    async fn non_200_envelope_code_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 400, "msg": "email already registered", "data": null
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .register(&RegisterRequest {
                email: "a@b.c".into(),
                verification_code: "1".into(),
                name: None,
            })
            .await
            .unwrap_err();
        match err {
            ApiError::Api { code, msg } => {
                assert_eq!(code, 400);
                assert_eq!(msg, "email already registered");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn too_many_requests_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/send-verification"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "42"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .send_verification_code(&SendVerificationRequest {
                email: "a@b.c".into(),
                purpose: VerificationPurpose::Login,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::RateLimited {
                retry_after_secs: Some(42)
            }
        ));
    }

    #[tokio::test]
    async fn http_failure_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401).set_body_string("no session"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_user_info().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("no session"));
    }

    #[tokio::test]
    async fn send_verification_tolerates_null_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/send-verification"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "msg": "sent", "data": null
            })))
            .mount(&server)
            .await;

        let resp = client_for(&server)
            .await
            .send_verification_code(&SendVerificationRequest {
                email: "a@b.c".into(),
                purpose: VerificationPurpose::Register,
            })
            .await
            .unwrap();
        assert_eq!(resp.message, "sent");
        assert_eq!(resp.cooldown_seconds, None);
    }

    #[tokio::test]
    async fn token_exchange_sends_code_and_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_json(json!({"code": "c0de", "code_verifier": "v3r"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "msg": "ok",
                "data": {"access_token": "at", "refresh_token": "rt", "token_type": "Bearer", "expires_in": 3600}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let token = client.exchange_code("c0de", "v3r").await.unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn refresh_sends_both_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/refresh"))
            .and(body_json(json!({"refresh_token": "rt", "access_token": "old"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "msg": "ok",
                "data": {
                    "access_token": "new", "refresh_token": "rt2",
                    "token_type": "Bearer", "expires_in": 7200
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let token = client
            .refresh_token(&RefreshTokenRequest {
                refresh_token: "rt".into(),
                access_token: "old".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            token,
            TokenResponse {
                access_token: "new".into(),
                refresh_token: "rt2".into(),
                token_type: "Bearer".into(),
                expires_in: 7200,
            }
        );
    }

    #[tokio::test]
    async fn refresh_with_expired_token_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 401, "msg": "refresh token expired", "data": null
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .refresh_token(&RefreshTokenRequest {
                refresh_token: "rt".into(),
                access_token: "old".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn logout_accepts_null_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "msg": "bye", "data": null
            })))
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).await.logout_center().await.unwrap(), "bye");
    }
}
