use thiserror::Error;

/// Why an authentication attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Injected cookies did not produce an authenticated landing page.
    CookieRejected,
    /// The login form was submitted but the landing route never appeared.
    LoginTimeout,
    /// The dashboard bounced the submitted credentials back to the login path.
    LoginRejected,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthFailure::CookieRejected => "cookie_rejected",
            AuthFailure::LoginTimeout => "login_timeout",
            AuthFailure::LoginRejected => "login_rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(AuthFailure),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("renewal did not take effect: expiry unchanged (was {old}, read {new})")]
    Verification { old: String, new: String },

    #[error("browser engine error: {0}")]
    Browser(#[from] anyhow::Error),

    #[error("notification delivery failed: {0}")]
    Notify(#[from] reqwest::Error),
}

impl Error {
    /// Process exit code for this failure. Success and a deliberate skip
    /// both exit 0; everything here is non-zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::Auth(_) => 3,
            Error::ElementNotFound(_) => 4,
            Error::Timeout(_) => 5,
            Error::Verification { .. } => 6,
            Error::Browser(_) | Error::Notify(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        assert_eq!(Error::Config("x".into()).exit_code(), 2);
        assert_eq!(Error::Auth(AuthFailure::CookieRejected).exit_code(), 3);
        assert_eq!(Error::ElementNotFound("#renew".into()).exit_code(), 4);
        assert_eq!(Error::Timeout("modal".into()).exit_code(), 5);
        let v = Error::Verification {
            old: "2026-03-01".into(),
            new: "2026-03-01".into(),
        };
        assert_eq!(v.exit_code(), 6);
    }

    #[test]
    fn auth_failure_labels() {
        assert_eq!(AuthFailure::LoginTimeout.to_string(), "login_timeout");
        assert_eq!(
            Error::Auth(AuthFailure::LoginRejected).to_string(),
            "authentication failed: login_rejected"
        );
    }
}
