use crate::callback_server::CallbackListener;
use sso_client::api::VerificationPurpose;
use sso_client::pkce::store::PKCE_STORAGE_KEY;
use sso_client::pkce::{FileStorage, SessionStorage};
use sso_client::{ApiError, AuthService, ConfigManager, FlowError};
use std::time::Duration;

fn session_storage(manager: &ConfigManager, session: &str) -> anyhow::Result<FileStorage> {
    let dir = manager
        .path()
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(ConfigManager::default_dir);
    FileStorage::new(dir.join("sessions"), session)
}

/// Start a flow. With `listen_timeout_secs`, also wait for the callback and finish it.
pub async fn run_begin(
    manager: &ConfigManager,
    session: &str,
    open_browser: bool,
    listen_timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let cfg = manager.load()?;
    let storage = session_storage(manager, session)?;

    if let Ok(Some(_)) = storage.get_item(PKCE_STORAGE_KEY) {
        tracing::info!("Replacing an unfinished authorization attempt in session '{}'", session);
    }

    // Bind before redirecting so the callback can't arrive first.
    let listener = match listen_timeout_secs {
        Some(_) => Some(CallbackListener::bind(&cfg.redirect_uri).await?),
        None => None,
    };

    let flow = cfg.authorization_flow(storage);
    let auth_url = flow.begin(&cfg.redirect_uri)?;

    if open_browser {
        let _ = open::that(&auth_url);
    }
    println!("Open this URL to sign in:\n\n{}\n", auth_url);

    let Some(listener) = listener else {
        println!(
            "When the browser lands on {}, run:\n  sso-client callback --session {} '<callback URL>'",
            cfg.redirect_uri, session
        );
        return Ok(());
    };

    let timeout = Duration::from_secs(listen_timeout_secs.unwrap_or_default());
    let callback_url = listener.wait(timeout).await?;
    run_callback(manager, session, &callback_url, true).await
}

/// Validate a callback against the stored attempt and optionally exchange the code.
pub async fn run_callback(
    manager: &ConfigManager,
    session: &str,
    callback_url: &str,
    exchange: bool,
) -> anyhow::Result<()> {
    let cfg = manager.load()?;
    let flow = cfg.authorization_flow(session_storage(manager, session)?);

    if !exchange {
        return match flow.handle_callback(callback_url) {
            sso_client::CallbackOutcome::Validated { code, .. } => {
                println!("Callback validated. Authorization code: {}", code);
                Ok(())
            }
            sso_client::CallbackOutcome::Rejected(reason) => {
                anyhow::bail!("{}", reason.user_message())
            }
        };
    }

    let api = cfg.api_client()?;
    match flow.complete(callback_url, &api).await {
        Ok(token) => {
            println!("{}", serde_json::to_string_pretty(&token)?);
            Ok(())
        }
        Err(FlowError::Rejected(reason)) => anyhow::bail!("{}", reason.user_message()),
        Err(FlowError::Exchange(e)) => anyhow::bail!("Token exchange failed: {}", e),
    }
}

pub async fn run_send_code(
    manager: &ConfigManager,
    email: &str,
    purpose: VerificationPurpose,
) -> anyhow::Result<()> {
    let cfg = manager.load()?;
    let mut service = AuthService::new(cfg.api_client()?, cfg.verification_cooldown());
    match service.send_verification_code(email, purpose).await {
        Ok(resp) => {
            let msg = if resp.message.is_empty() {
                "Verification code sent"
            } else {
                resp.message.as_str()
            };
            println!("{} (next code available in {}s)", msg, service.cooldown_remaining());
            Ok(())
        }
        Err(ApiError::RateLimited { .. }) => {
            anyhow::bail!(
                "Verification codes requested too often, try again in {}s",
                service.cooldown_remaining()
            )
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run_register(
    manager: &ConfigManager,
    email: &str,
    code: &str,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let cfg = manager.load()?;
    let service = AuthService::new(cfg.api_client()?, cfg.verification_cooldown());
    let resp = service.register(email, code, name).await?;
    println!("Registered (id {}). Request a login code to sign in.", resp.id);
    Ok(())
}

pub async fn run_login(
    manager: &ConfigManager,
    email: &str,
    code: &str,
    authorize_url: Option<&str>,
    logout: bool,
) -> anyhow::Result<()> {
    let cfg = manager.load()?;
    let mut service = AuthService::new(cfg.api_client()?, cfg.verification_cooldown());

    let user = service.login(email, code).await?;
    println!("Signed in as {}", user.display_name());

    let result = match authorize_url {
        Some(url) => authorize(&service, url).await,
        None => Ok(()),
    };

    if logout {
        if let Err(e) = service.logout().await {
            tracing::warn!("Logout failed: {}", e);
        } else {
            println!("Signed out of the login center");
        }
    }
    result
}

async fn authorize(service: &AuthService, url: &str) -> anyhow::Result<()> {
    let req = sso_client::pkce::authorize::parse_authorize_request(url)?;
    let redirect = service.authorize(&req).await?;
    println!("Authorization granted. Redirecting to {}", req.redirect_uri);
    println!("{}", redirect);
    let _ = open::that(&redirect);
    Ok(())
}

pub fn run_config_show(manager: &ConfigManager) -> anyhow::Result<()> {
    let cfg = manager.load()?;
    println!("# {}", manager.path().display());
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}

pub fn run_config_set(manager: &ConfigManager, key: &str, value: &str) -> anyhow::Result<()> {
    manager.set_value(key, value)?;
    println!("Set {} in {}", key, manager.path().display());
    Ok(())
}
