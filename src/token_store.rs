//! Session token persistence — the cross-process handoff surface.
//!
//! A run that authenticates through the login form exports its cookie jar
//! plus the user-agent string it presented; a later run (this binary again,
//! or any other engine that understands the format) replays both before its
//! first navigation and skips the login form entirely. The token is plain
//! data; nothing in it is specific to one automation engine.
//!
//! Stored as `~/.renewbot/session.json`, written atomically (temp + rename)
//! so a cancelled run never leaves a truncated token behind.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::credential::CookieRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionToken {
    pub cookies: Vec<CookieRecord>,
    pub user_agent: String,
}

impl SessionToken {
    /// Capture the live context's jar and UA. Returns `None` for an empty
    /// jar; there is nothing worth replaying.
    pub async fn capture(session: &BrowserSession) -> Option<Self> {
        let cookies = match session.export_cookies().await {
            Ok(c) => c,
            Err(e) => {
                warn!("token_store: cookie export failed: {}", e);
                return None;
            }
        };
        if cookies.is_empty() {
            return None;
        }
        Some(SessionToken {
            cookies,
            user_agent: session.user_agent().to_string(),
        })
    }

    /// Apply the token to a fresh context. Must run before any navigation;
    /// a partially-applied token leaves the engine unauthenticated, so the
    /// whole jar goes down in one `setCookies` call.
    pub async fn apply(&self, session: &BrowserSession) -> anyhow::Result<()> {
        session.set_cookies(&self.cookies).await?;
        info!(
            "token_store: applied stored session ({} cookies)",
            self.cookies.len()
        );
        Ok(())
    }
}

/// Default token location (`~/.renewbot/session.json`).
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".renewbot").join("session.json"))
}

/// Load a stored token. Missing or unreadable files yield `None`; the
/// caller falls back to the configured credentials.
pub fn load(path: &Path) -> Option<SessionToken> {
    if !path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<SessionToken>(&content) {
        Ok(token) if !token.cookies.is_empty() => {
            info!(
                "token_store: loaded session token ({} cookies) from {}",
                token.cookies.len(),
                path.display()
            );
            Some(token)
        }
        Ok(_) => None,
        Err(e) => {
            warn!("token_store: failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

/// Persist a token atomically. Failures are logged, not fatal; the next
/// run simply pays the login-form cost again.
pub fn save(path: &Path, token: &SessionToken) {
    let write = || -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(token)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    };
    match write() {
        Ok(()) => info!(
            "token_store: exported session token ({} cookies) to {}",
            token.cookies.len(),
            path.display()
        ),
        Err(e) => warn!("token_store: export failed: {}", e),
    }
}

/// Remove a stored token that failed to authenticate, so the next run does
/// not retry a jar that is known dead.
pub fn invalidate(path: &Path) {
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => info!("token_store: removed stale token {}", path.display()),
            Err(e) => warn!("token_store: failed to remove {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token() -> SessionToken {
        SessionToken {
            cookies: vec![CookieRecord {
                name: "session".into(),
                value: "abc123".into(),
                domain: "dashboard.katabump.com".into(),
                path: "/".into(),
                secure: true,
                http_only: true,
            }],
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Chrome/131.0.0.0".into(),
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let token = sample_token();
        save(&path, &token);
        assert_eq!(load(&path), Some(token));
    }

    #[test]
    fn missing_or_corrupt_token_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        assert!(load(&path).is_none());
        std::fs::write(&path, "{").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn empty_jar_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let token = SessionToken {
            cookies: vec![],
            user_agent: "ua".into(),
        };
        save(&path, &token);
        assert!(load(&path).is_none());
    }

    #[test]
    fn invalidate_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        save(&path, &sample_token());
        assert!(path.exists());
        invalidate(&path);
        assert!(!path.exists());
        // Idempotent on a missing file.
        invalidate(&path);
    }
}
