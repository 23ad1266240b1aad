//! Workflow scenarios that need no browser: gate cadence, credential
//! preference, token handoff, and result/exit-code mapping.

use std::collections::HashMap;

use chrono::NaiveDate;
use renewbot::credential::CookieRecord;
use renewbot::error::AuthFailure;
use renewbot::gate::{decide, GateDecision};
use renewbot::registry::Registry;
use renewbot::run::{RunResult, RunStatus};
use renewbot::token_store::{self, SessionToken};
use renewbot::{config, Config, Credential, Error};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn config_from(pairs: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vars.entry(config::ENV_SERVER_ID.to_string())
        .or_insert_with(|| "105562".to_string());
    Config::from_vars(&vars).unwrap()
}

// Scenario: expiry = tomorrow → the gate acts.
#[test]
fn gate_acts_the_day_before_expiry() {
    let today = d("2026-08-08");
    assert_eq!(decide(d("2026-08-09"), today, false), GateDecision::Act);
}

// Scenario: expiry = in 5 days → skipped, and with a fresh registry record
// the skip happens before any session is established.
#[test]
fn far_expiry_skips_before_any_browser_work() {
    assert_eq!(
        decide(d("2026-08-13"), d("2026-08-08"), false),
        GateDecision::Skip { delta_days: 5 }
    );

    // The registry stamps observations with the real clock, so the
    // fast-path check runs against clock-relative dates.
    let today = chrono::Utc::now().date_naive();
    let expiry = today + chrono::Duration::days(5);
    let dir = tempfile::tempdir().unwrap();
    let reg = Registry::open(dir.path().join("state.json"));
    reg.record_observation("105562", expiry);
    let rec = reg.get("105562").unwrap();
    assert!(rec.can_skip_without_browser(today));
}

// Fallback ordering: with both materials configured, the cookie credential
// comes first and the password path exists exactly once behind it.
#[test]
fn cookie_credential_precedes_password_fallback() {
    let cfg = config_from(&[
        (config::ENV_COOKIES, "session=abc; remember=1"),
        (config::ENV_EMAIL, "ops@example.com"),
        (config::ENV_PASSWORD, "hunter2"),
    ]);
    let creds = Credential::resolve(&cfg).unwrap();
    let kinds: Vec<&str> = creds.iter().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec!["cookies", "password"]);
}

#[test]
fn missing_credentials_is_a_config_error() {
    let cfg = config_from(&[]);
    match Credential::resolve(&cfg) {
        Err(Error::Config(msg)) => assert!(msg.contains("RENEWBOT_COOKIES")),
        other => panic!("expected config error, got {other:?}"),
    }
}

// Cross-process handoff: the token a password-login run exports is exactly
// what a cookie run imports, as plain engine-agnostic data.
#[test]
fn session_token_survives_the_process_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let exported = SessionToken {
        cookies: vec![
            CookieRecord {
                name: "session".into(),
                value: "eyJhbGciOiJIUzI1NiJ9.payload.sig".into(),
                domain: "dashboard.katabump.com".into(),
                path: "/".into(),
                secure: true,
                http_only: true,
            },
            CookieRecord {
                name: "remember".into(),
                value: "1".into(),
                domain: "dashboard.katabump.com".into(),
                path: "/".into(),
                secure: true,
                http_only: false,
            },
        ],
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) Chrome/131.0.0.0".into(),
    };
    token_store::save(&path, &exported);

    // "Second engine": fresh load from disk, nothing shared in memory.
    let imported = token_store::load(&path).expect("token should load");
    assert_eq!(imported, exported);
    assert_eq!(imported.cookies.len(), 2);
    assert_eq!(imported.user_agent, exported.user_agent);
}

// Exit-code contract: success and skip are both 0; each failure class has
// its own non-zero code.
#[test]
fn exit_codes_follow_the_taxonomy() {
    let ok = RunResult::success(d("2026-08-09"), d("2026-09-09"));
    assert_eq!(ok.status, RunStatus::Success);
    let skip = RunResult::skipped(Some(d("2026-08-13")), "expiry 5 days out".into());
    assert_eq!(skip.status, RunStatus::Skipped);

    assert_eq!(Error::Config("missing".into()).exit_code(), 2);
    assert_eq!(Error::Auth(AuthFailure::LoginRejected).exit_code(), 3);
    assert_eq!(Error::ElementNotFound("button".into()).exit_code(), 4);
    assert_eq!(
        Error::Timeout("challenge resolution after 3 attempts".into()).exit_code(),
        5
    );
    assert_eq!(
        Error::Verification {
            old: "2026-08-09".into(),
            new: "2026-08-09".into()
        }
        .exit_code(),
        6
    );
}

// Failure results keep enough detail for the one notification a run sends.
#[test]
fn failed_run_summary_names_the_cause() {
    let err = Error::Timeout("challenge resolution after 3 attempts".into());
    let result = RunResult::failed(&err, Some(d("2026-08-09")));
    let text = result.summary();
    assert!(text.contains("challenge resolution after 3 attempts"));
    assert!(text.contains("2026-08-09"));
}
