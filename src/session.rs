//! Session establishment — cookie first, password fallback.
//!
//! The preference order is fixed here and nowhere else: a stored session
//! token (previous run's export), then the configured cookie jar, then the
//! login form. Success is classified by where the dashboard actually lands
//! us, not by what we submitted; an expired cookie navigates fine and then
//! bounces to `/login`.

use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::credential::Credential;
use crate::diagnostics::DiagnosticsSink;
use crate::error::{AuthFailure, Error, Result};
use crate::poll;
use crate::token_store::{self, SessionToken};

/// True when `url` sits on the login/auth surface, the signature of a
/// rejected or absent session.
pub fn on_auth_path(url: &str) -> bool {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    path.starts_with("/login") || path.starts_with("/auth") || path.starts_with("/signin")
}

/// Establish an authenticated session on `session`.
///
/// `stored_token` is tried before the configured credentials; a token that
/// fails is invalidated on disk so the next run skips it. On any failure
/// path a diagnostic screenshot is captured before the error propagates.
pub async fn establish(
    session: &BrowserSession,
    credentials: &[Credential],
    stored_token: Option<&SessionToken>,
    config: &Config,
    sink: &DiagnosticsSink,
) -> Result<()> {
    let has_password = credentials
        .iter()
        .any(|c| matches!(c, Credential::Password { .. }));

    if let Some(token) = stored_token {
        info!("session: trying stored session token");
        match try_cookie_path(session, config, move || token.apply(session)).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("session: stored token rejected ({}) — falling back", e);
                if let Some(path) = token_store::default_path() {
                    token_store::invalidate(&path);
                }
            }
        }
    }

    for credential in credentials {
        match credential {
            Credential::Cookies(jar) => {
                info!("session: trying configured cookie jar ({} cookies)", jar.len());
                match try_cookie_path(session, config, move || async move {
                    session.set_cookies(jar).await
                })
                .await
                {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!("session: cookie jar rejected ({})", e);
                        if !has_password {
                            sink.capture(session, "auth_cookie_rejected").await;
                            return Err(Error::Auth(AuthFailure::CookieRejected));
                        }
                        // Fall through to the password credential; the
                        // cookie path is never retried.
                    }
                }
            }
            Credential::Password { email, password } => {
                info!("session: logging in via form as {}", email);
                return match login(session, email, password, config).await {
                    Ok(()) => {
                        export_token(session).await;
                        Ok(())
                    }
                    Err(e) => {
                        sink.capture(session, "auth_login_failed").await;
                        Err(e)
                    }
                };
            }
        }
    }

    sink.capture(session, "auth_exhausted").await;
    Err(Error::Auth(AuthFailure::CookieRejected))
}

/// Inject session material, navigate to the landing route, and classify the
/// result by the final URL.
async fn try_cookie_path<F, Fut>(
    session: &BrowserSession,
    config: &Config,
    inject: F,
) -> anyhow::Result<()>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    // Atomic handoff: the whole jar is applied before the first navigation.
    inject().await?;
    session
        .goto(&config.landing_url(), config.nav_timeout)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let landed = session.current_url().await?;
    if on_auth_path(&landed) {
        anyhow::bail!("redirected to {}", landed);
    }
    info!("session: authenticated (landed on {})", landed);
    Ok(())
}

/// Password login: fill the form, submit, wait for the landing route.
async fn login(
    session: &BrowserSession,
    email: &str,
    password: &str,
    config: &Config,
) -> Result<()> {
    session.goto(&config.login_url(), config.nav_timeout).await?;
    session.type_into("input[name=\"email\"]", email).await?;
    session.type_into("input[name=\"password\"]", password).await?;
    session.click("button[type=\"submit\"]").await?;

    let landing = config.landing_url();
    let landing_ref: &str = &landing;
    let waited = poll::until(
        "post-login navigation",
        config.login_timeout,
        poll::DEFAULT_INTERVAL,
        move || async move {
            let here = session.current_url().await?;
            Ok(here.starts_with(landing_ref))
        },
    )
    .await;

    match waited {
        Ok(elapsed) => {
            info!("session: login completed in {}ms", elapsed.as_millis());
            Ok(())
        }
        Err(_) => {
            // Timed out short of the landing route: a bounce back to the
            // auth surface means rejected credentials, anything else is a
            // slow or broken navigation.
            let here = session.current_url().await.unwrap_or_default();
            if on_auth_path(&here) {
                Err(Error::Auth(AuthFailure::LoginRejected))
            } else {
                Err(Error::Auth(AuthFailure::LoginTimeout))
            }
        }
    }
}

/// Export the freshly-authenticated jar for the next run. Best-effort.
async fn export_token(session: &BrowserSession) {
    let Some(path) = token_store::default_path() else {
        return;
    };
    if let Some(token) = SessionToken::capture(session).await {
        token_store::save(&path, &token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_path_classification() {
        assert!(on_auth_path("https://dashboard.katabump.com/login"));
        assert!(on_auth_path("https://dashboard.katabump.com/login?next=%2Fdashboard"));
        assert!(on_auth_path("https://dashboard.katabump.com/auth/login"));
        assert!(on_auth_path("https://dashboard.katabump.com/signin"));

        assert!(!on_auth_path("https://dashboard.katabump.com/dashboard"));
        assert!(!on_auth_path("https://dashboard.katabump.com/servers/edit?id=1"));
        // Path check, not substring check: "login" elsewhere must not match.
        assert!(!on_auth_path("https://dashboard.katabump.com/dashboard?from=login"));
    }
}
