//! Identity material for a run.
//!
//! Two shapes exist: a serialized cookie jar and an email+password pair.
//! Cookie material is always preferred: it skips the login form entirely and
//! keeps the password out of the hot path. The preference order lives here,
//! not scattered across presence checks.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};

/// One cookie with the scoping attributes CDP needs to replay it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone)]
pub enum Credential {
    Cookies(Vec<CookieRecord>),
    Password { email: String, password: String },
}

impl Credential {
    /// Resolve all configured identity material, preference-ordered:
    /// cookie jar first, password second. Errors when neither is complete.
    pub fn resolve(config: &Config) -> Result<Vec<Credential>> {
        let mut out = Vec::new();

        if let Some(header) = &config.cookie_header {
            let jar = parse_cookie_header(header, &cookie_domain(&config.base_url));
            if !jar.is_empty() {
                out.push(Credential::Cookies(jar));
            }
        }

        if let (Some(email), Some(password)) = (&config.email, &config.password) {
            out.push(Credential::Password {
                email: email.clone(),
                password: password.clone(),
            });
        }

        if out.is_empty() {
            return Err(Error::Config(
                "no usable credentials: set RENEWBOT_COOKIES or both RENEWBOT_EMAIL and RENEWBOT_PASSWORD"
                    .to_string(),
            ));
        }
        Ok(out)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Cookies(_) => "cookies",
            Credential::Password { .. } => "password",
        }
    }
}

/// Hostname the configured jar cookies should be scoped to.
fn cookie_domain(base_url: &str) -> String {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

/// Parse a `name=value; name=value` header string into scoped records.
///
/// Values may themselves contain `=` (JWTs, base64); only the first `=`
/// splits. Malformed segments are skipped rather than failing the jar.
pub fn parse_cookie_header(header: &str, domain: &str) -> Vec<CookieRecord> {
    header
        .split(';')
        .filter_map(|segment| {
            let segment = segment.trim();
            let (name, value) = segment.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(CookieRecord {
                name: name.to_string(),
                value: value.trim().to_string(),
                domain: domain.to_string(),
                path: "/".to_string(),
                secure: true,
                http_only: true,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use std::collections::HashMap;

    fn base_config(pairs: &[(&str, &str)]) -> Config {
        let mut vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vars.insert(config::ENV_SERVER_ID.to_string(), "105562".to_string());
        Config::from_vars(&vars).unwrap()
    }

    #[test]
    fn header_parsing_splits_on_first_equals_only() {
        let jar = parse_cookie_header("session=abc=def; theme=dark", "example.com");
        assert_eq!(jar.len(), 2);
        assert_eq!(jar[0].name, "session");
        assert_eq!(jar[0].value, "abc=def");
        assert_eq!(jar[0].domain, "example.com");
        assert_eq!(jar[0].path, "/");
    }

    #[test]
    fn malformed_segments_are_skipped() {
        let jar = parse_cookie_header("; =orphan; good=1;;", "example.com");
        assert_eq!(jar.len(), 1);
        assert_eq!(jar[0].name, "good");
    }

    #[test]
    fn cookies_are_preferred_over_password() {
        let cfg = base_config(&[
            (config::ENV_COOKIES, "session=tok"),
            (config::ENV_EMAIL, "me@example.com"),
            (config::ENV_PASSWORD, "hunter2"),
        ]);
        let creds = Credential::resolve(&cfg).unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].kind(), "cookies");
        assert_eq!(creds[1].kind(), "password");
    }

    #[test]
    fn password_requires_both_halves() {
        let cfg = base_config(&[(config::ENV_EMAIL, "me@example.com")]);
        let err = Credential::resolve(&cfg).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn jar_of_only_garbage_counts_as_absent() {
        let cfg = base_config(&[
            (config::ENV_COOKIES, ";;;"),
            (config::ENV_EMAIL, "me@example.com"),
            (config::ENV_PASSWORD, "hunter2"),
        ]);
        let creds = Credential::resolve(&cfg).unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].kind(), "password");
    }

    #[test]
    fn jar_domain_comes_from_base_url() {
        let cfg = base_config(&[(config::ENV_COOKIES, "a=1")]);
        match &Credential::resolve(&cfg).unwrap()[0] {
            Credential::Cookies(jar) => {
                assert_eq!(jar[0].domain, "dashboard.katabump.com")
            }
            other => panic!("expected cookies, got {}", other.kind()),
        }
    }

    #[test]
    fn cookie_record_serde_round_trip() {
        let rec = CookieRecord {
            name: "sid".into(),
            value: "v".into(),
            domain: "d".into(),
            path: "/".into(),
            secure: true,
            http_only: false,
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: CookieRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
