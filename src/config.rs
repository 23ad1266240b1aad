//! Immutable run configuration.
//!
//! Everything is read from the environment exactly once (in `main`, via
//! [`Config::from_env`]) and handed to components by reference. No module
//! below this one touches ambient process state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const ENV_EMAIL: &str = "RENEWBOT_EMAIL";
pub const ENV_PASSWORD: &str = "RENEWBOT_PASSWORD";
pub const ENV_COOKIES: &str = "RENEWBOT_COOKIES";
pub const ENV_SERVER_ID: &str = "RENEWBOT_SERVER_ID";
pub const ENV_BASE_URL: &str = "RENEWBOT_BASE_URL";
pub const ENV_TELEGRAM_TOKEN: &str = "RENEWBOT_TELEGRAM_TOKEN";
pub const ENV_TELEGRAM_CHAT: &str = "RENEWBOT_TELEGRAM_CHAT";
pub const ENV_FORCE: &str = "RENEWBOT_FORCE";
pub const ENV_SHOT_DIR: &str = "RENEWBOT_SHOT_DIR";
pub const ENV_EXPIRY_SELECTOR: &str = "RENEWBOT_EXPIRY_SELECTOR";
pub const ENV_CHALLENGE_TIMEOUT: &str = "RENEWBOT_CHALLENGE_TIMEOUT_SECS";
pub const ENV_ATTEMPTS: &str = "RENEWBOT_ATTEMPTS";

const DEFAULT_BASE_URL: &str = "https://dashboard.katabump.com";

#[derive(Debug, Clone)]
pub struct Config {
    /// Dashboard origin, no trailing slash.
    pub base_url: String,
    /// Target resource identifier (`servers/edit?id={server_id}`).
    pub server_id: String,

    pub email: Option<String>,
    pub password: Option<String>,
    /// Raw `name=value; name=value` jar string, if configured.
    pub cookie_header: Option<String>,

    pub telegram_token: Option<String>,
    pub telegram_chat: Option<String>,

    /// Bypass the scheduling gate and renew regardless of expiry delta.
    pub force: bool,

    pub shot_dir: PathBuf,
    /// CSS selector for the expiry field; empty means "scan the page body".
    pub expiry_selector: String,
    /// Exact label of the renewal action control.
    pub renew_label: String,
    /// Confirmation modal container.
    pub modal_selector: String,

    pub nav_timeout: Duration,
    pub login_timeout: Duration,
    pub modal_timeout: Duration,
    pub challenge_detect_timeout: Duration,
    /// Server-side risk scoring can be slow; keep this longer than `nav_timeout`.
    pub challenge_resolve_timeout: Duration,
    pub attempts: u32,
}

impl Config {
    /// Build from the real process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let mut cfg = Self::from_vars(&vars)?;
        // `--force` on the command line wins over the env toggle.
        if std::env::args().any(|a| a == "--force") {
            cfg.force = true;
        }
        Ok(cfg)
    }

    /// Build from an explicit variable map. Split out of [`from_env`] so the
    /// resolution rules are testable without mutating process state.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |k: &str| vars.get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server_id = get(ENV_SERVER_ID)
            .ok_or_else(|| Error::Config(format!("{ENV_SERVER_ID} is required")))?;

        let base_url = get(ENV_BASE_URL)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let shot_dir = get(ENV_SHOT_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("renewbot-shots"));

        let secs = |k: &str, default: u64| -> u64 {
            get(k).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        Ok(Config {
            base_url,
            server_id,
            email: get(ENV_EMAIL),
            password: get(ENV_PASSWORD),
            cookie_header: get(ENV_COOKIES),
            telegram_token: get(ENV_TELEGRAM_TOKEN),
            telegram_chat: get(ENV_TELEGRAM_CHAT),
            force: get(ENV_FORCE)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
            shot_dir,
            expiry_selector: get(ENV_EXPIRY_SELECTOR).unwrap_or_default(),
            renew_label: "Renew".to_string(),
            modal_selector: "#renew-modal".to_string(),
            nav_timeout: Duration::from_secs(30),
            login_timeout: Duration::from_secs(20),
            modal_timeout: Duration::from_secs(15),
            challenge_detect_timeout: Duration::from_secs(10),
            challenge_resolve_timeout: Duration::from_secs(secs(ENV_CHALLENGE_TIMEOUT, 30).max(30)),
            attempts: secs(ENV_ATTEMPTS, 3).clamp(1, 10) as u32,
        })
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.base_url)
    }

    /// Authenticated landing route used to classify session validity.
    pub fn landing_url(&self) -> String {
        format!("{}/dashboard", self.base_url)
    }

    pub fn resource_url(&self) -> String {
        format!("{}/servers/edit?id={}", self.base_url, self.server_id)
    }
}
