use crate::api::{ApiPaths, SsoApiClient};
use crate::flow::AuthorizationFlow;
use crate::persist;
use crate::pkce::SessionStorage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The config file structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the SSO HTTP API.
    pub api_base_url: String,

    /// Login center page that receives authorization requests.
    pub authorize_url: String,

    /// Where the login center sends the user back to.
    pub redirect_uri: String,

    pub api_paths: ApiPaths,

    /// Fallback wait between verification emails when the server names none.
    pub verification_cooldown_secs: u64,

    /// Reject callbacks older than this. Unset means no limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_state_age_secs: Option<u64>,

    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".into(),
            authorize_url: "http://localhost:5173/authorize".into(),
            redirect_uri: "http://127.0.0.1:8976/callback".into(),
            api_paths: ApiPaths::default(),
            verification_cooldown_secs: 60,
            max_state_age_secs: None,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Keys accepted by [`AppConfig::set`].
    pub const KEYS: &'static [&'static str] = &[
        "api_base_url",
        "authorize_url",
        "redirect_uri",
        "verification_cooldown_secs",
        "max_state_age_secs",
        "request_timeout_secs",
    ];

    /// Set a single top-level value from its string form. An empty value unsets
    /// `max_state_age_secs`.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        match key {
            "api_base_url" => self.api_base_url = parse_url(value)?,
            "authorize_url" => self.authorize_url = parse_url(value)?,
            "redirect_uri" => self.redirect_uri = parse_url(value)?,
            "verification_cooldown_secs" => self.verification_cooldown_secs = value.parse()?,
            "max_state_age_secs" => {
                self.max_state_age_secs = if value.is_empty() {
                    None
                } else {
                    Some(value.parse()?)
                }
            }
            "request_timeout_secs" => self.request_timeout_secs = value.parse()?,
            other => anyhow::bail!(
                "unknown config key: {} (expected one of {})",
                other,
                Self::KEYS.join(", ")
            ),
        }
        Ok(())
    }

    pub fn verification_cooldown(&self) -> Duration {
        Duration::from_secs(self.verification_cooldown_secs)
    }

    pub fn max_state_age(&self) -> Option<Duration> {
        self.max_state_age_secs.map(Duration::from_secs)
    }

    pub fn api_client(&self) -> anyhow::Result<SsoApiClient> {
        Ok(SsoApiClient::new(
            &self.api_base_url,
            self.api_paths.clone(),
            Duration::from_secs(self.request_timeout_secs),
        )?)
    }

    pub fn authorization_flow<S: SessionStorage>(&self, storage: S) -> AuthorizationFlow<S> {
        AuthorizationFlow::new(storage, self.authorize_url.clone())
            .with_max_state_age(self.max_state_age())
    }
}

fn parse_url(value: &str) -> anyhow::Result<String> {
    let parsed = url::Url::parse(value)?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("expected an http(s) URL, got {}", value);
    }
    Ok(value.to_string())
}

/// Reads and writes the config file with a file lock and atomic replace.
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Config manager for `~/.sso-client/config.json`.
    pub fn default_path() -> Self {
        Self::new(Self::default_dir().join("config.json"))
    }

    /// `~/.sso-client`, also the parent of the session store directory.
    pub fn default_dir() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".sso-client")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_unlocked(&self) -> anyhow::Result<AppConfig> {
        match persist::read_optional(&self.path)? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(AppConfig::default()),
        }
    }

    fn save_unlocked(&self, config: &AppConfig) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        persist::write_atomic(&self.path, json.as_bytes())
    }

    /// Load the config. Returns defaults if the file doesn't exist.
    pub fn load(&self) -> anyhow::Result<AppConfig> {
        persist::with_exclusive_lock(&self.path, || self.load_unlocked())
    }

    pub fn save(&self, config: &AppConfig) -> anyhow::Result<()> {
        persist::with_exclusive_lock(&self.path, || self.save_unlocked(config))
    }

    /// Load, set one key, save; all under the lock.
    pub fn set_value(&self, key: &str, value: &str) -> anyhow::Result<AppConfig> {
        persist::with_exclusive_lock(&self.path, || {
            let mut cfg = self.load_unlocked()?;
            cfg.set(key, value)?;
            self.save_unlocked(&cfg)?;
            Ok(cfg)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_cfg() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        (dir, ConfigManager::new(path))
    }

    #[test]
    fn missing_file_loads_defaults() {
        let (_dir, mgr) = tmp_cfg();
        let cfg = mgr.load().unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.verification_cooldown_secs, 60);
        assert_eq!(cfg.max_state_age(), None);
    }

    #[test]
    fn save_then_load() {
        let (_dir, mgr) = tmp_cfg();
        let mut cfg = AppConfig::default();
        cfg.api_base_url = "https://sso.example/api".into();
        cfg.max_state_age_secs = Some(600);
        mgr.save(&cfg).unwrap();
        assert_eq!(mgr.load().unwrap(), cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let (_dir, mgr) = tmp_cfg();
        std::fs::write(mgr.path(), r#"{"redirect_uri":"https://client.example/cb"}"#).unwrap();
        let cfg = mgr.load().unwrap();
        assert_eq!(cfg.redirect_uri, "https://client.example/cb");
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.api_paths, ApiPaths::default());
    }

    #[test]
    fn set_value_persists_and_validates() {
        let (_dir, mgr) = tmp_cfg();
        mgr.set_value("max_state_age_secs", "300").unwrap();
        assert_eq!(mgr.load().unwrap().max_state_age(), Some(Duration::from_secs(300)));

        mgr.set_value("max_state_age_secs", "").unwrap();
        assert_eq!(mgr.load().unwrap().max_state_age_secs, None);

        assert!(mgr.set_value("redirect_uri", "ftp://x").is_err());
        assert!(mgr.set_value("redirect_uri", "not a url").is_err());
        assert!(mgr.set_value("nope", "1").is_err());
        assert!(mgr.set_value("request_timeout_secs", "soon").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, mgr) = tmp_cfg();
        mgr.save(&AppConfig::default()).unwrap();
        let mode = std::fs::metadata(mgr.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
