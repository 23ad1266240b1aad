//! The renewal run — one sequential pass through the whole workflow.
//!
//! Gate → establish → read state → trigger → challenge → submit → verify.
//! The browser session is owned by this module and released on every exit
//! path. The retry loop only covers challenge resolution; everything else
//! fails fast.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::challenge::{ChallengeOutcome, ChallengeResolver};
use crate::config::Config;
use crate::credential::Credential;
use crate::diagnostics::DiagnosticsSink;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::renewal;
use crate::resource;
use crate::token_store;
use crate::verify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Skipped,
    Failed,
}

/// The single product of a run, consumed by the diagnostics sink.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub old_expiry: Option<NaiveDate>,
    pub new_expiry: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn success(old: NaiveDate, new: NaiveDate) -> Self {
        Self {
            status: RunStatus::Success,
            old_expiry: Some(old),
            new_expiry: Some(new),
            error_detail: None,
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(observed: Option<NaiveDate>, why: String) -> Self {
        Self {
            status: RunStatus::Skipped,
            old_expiry: observed,
            new_expiry: None,
            error_detail: Some(why),
            finished_at: Utc::now(),
        }
    }

    pub fn failed(error: &Error, old: Option<NaiveDate>) -> Self {
        Self {
            status: RunStatus::Failed,
            old_expiry: old,
            new_expiry: None,
            error_detail: Some(error.to_string()),
            finished_at: Utc::now(),
        }
    }

    /// One-line human summary for the notification channel.
    pub fn summary(&self) -> String {
        let fmt_date = |d: &Option<NaiveDate>| {
            d.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string())
        };
        match self.status {
            RunStatus::Success => format!(
                "✅ renewal verified: expiry {} → {} ({})",
                fmt_date(&self.old_expiry),
                fmt_date(&self.new_expiry),
                self.finished_at.to_rfc3339()
            ),
            RunStatus::Skipped => format!(
                "⏭️ renewal skipped: {} (expiry {}, {})",
                self.error_detail.as_deref().unwrap_or("gate declined"),
                fmt_date(&self.old_expiry),
                self.finished_at.to_rfc3339()
            ),
            RunStatus::Failed => format!(
                "❌ renewal failed: {} (expiry {}, {})",
                self.error_detail.as_deref().unwrap_or("unknown error"),
                fmt_date(&self.old_expiry),
                self.finished_at.to_rfc3339()
            ),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum RunPhase {
    GateCheck,
    CredentialResolve,
    BrowserLaunch,
    Establish,
    ReadState,
    Trigger,
    ChallengeResolution,
    Submit,
    Verify,
    Done,
}

fn log_phase(phase: RunPhase) {
    info!("run_state={:?}", phase);
}

/// Execute one run end-to-end. `Ok` covers success *and* a deliberate skip;
/// `Err` is any failure after the caller's single notification.
pub async fn run(config: &Config, sink: &DiagnosticsSink) -> Result<RunResult> {
    let today = Local::now().date_naive();
    let registry = Registry::open_default();

    // Fast-path gate: a fresh cached expiry far enough out means nothing to
    // do, with no browser launch and no load on the dashboard.
    log_phase(RunPhase::GateCheck);
    if !config.force {
        if let Some(rec) = registry
            .as_ref()
            .and_then(|r| r.get(&config.server_id))
        {
            if rec.can_skip_without_browser(today) {
                let delta = (rec.expiry - today).num_days();
                info!(
                    "run: cached expiry {} is {} days out — skipping without a browser",
                    rec.expiry, delta
                );
                return Ok(RunResult::skipped(
                    Some(rec.expiry),
                    format!("expiry {} days out (cached)", delta),
                ));
            }
        }
    }

    log_phase(RunPhase::CredentialResolve);
    let credentials = Credential::resolve(config)?;
    let stored_token = token_store::default_path().and_then(|p| token_store::load(&p));

    log_phase(RunPhase::BrowserLaunch);
    let session =
        BrowserSession::launch(stored_token.as_ref().map(|t| t.user_agent.as_str())).await?;

    // Scoped session: whatever happens below, the browser is released.
    let outcome = drive(
        &session,
        &credentials,
        stored_token.as_ref(),
        config,
        sink,
        registry.as_ref(),
        today,
    )
    .await;
    if let Err(e) = &outcome {
        // Last look at the page before teardown; the notification only
        // carries text, the screenshot carries the why.
        warn!("run: failing with {} — capturing final state", e);
        sink.capture(&session, "failure").await;
    }
    session.close().await;

    if outcome.is_ok() {
        log_phase(RunPhase::Done);
    }
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    session: &BrowserSession,
    credentials: &[Credential],
    stored_token: Option<&token_store::SessionToken>,
    config: &Config,
    sink: &DiagnosticsSink,
    registry: Option<&Registry>,
    today: NaiveDate,
) -> Result<RunResult> {
    log_phase(RunPhase::Establish);
    crate::session::establish(session, credentials, stored_token, config, sink).await?;

    log_phase(RunPhase::ReadState);
    let state = resource::read_state(session, config).await?;
    let old_expiry = state.expiry;
    if let Some(reg) = registry {
        reg.record_observation(&config.server_id, old_expiry);
    }
    sink.capture(session, "before_action").await;

    // Live gate decision on the freshly observed expiry.
    match crate::gate::decide(old_expiry, today, config.force) {
        crate::gate::GateDecision::Act => {}
        crate::gate::GateDecision::Skip { delta_days } => {
            return Ok(RunResult::skipped(
                Some(old_expiry),
                format!("expiry {} days out", delta_days),
            ));
        }
    }

    submit_with_retries(session, config, sink, old_expiry).await?;

    log_phase(RunPhase::Verify);
    let new_expiry = verify::verify(session, old_expiry, config, sink).await?;
    if let Some(reg) = registry {
        reg.record_renewal(&config.server_id, new_expiry);
    }
    sink.capture(session, "verified").await;

    Ok(RunResult::success(old_expiry, new_expiry))
}

/// Open-modal → resolve-challenge → submit, with up to `config.attempts`
/// full attempts. Only a challenge timeout re-enters the loop; structural
/// failures (missing button, modal never shown) abort immediately.
async fn submit_with_retries(
    session: &BrowserSession,
    config: &Config,
    sink: &DiagnosticsSink,
    old_expiry: NaiveDate,
) -> Result<()> {
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_secs(5),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    for attempt in 1..=config.attempts {
        if attempt > 1 {
            // Re-opening the modal from a clean page discards the dead
            // widget; the failed attempt's token (if any) is abandoned.
            session.goto(&config.resource_url(), config.nav_timeout).await?;
        }

        log_phase(RunPhase::Trigger);
        let modal = renewal::open_confirmation(session, config).await?;
        if attempt == 1 {
            sink.capture(session, "modal_open").await;
        }

        log_phase(RunPhase::ChallengeResolution);
        let mut resolver = ChallengeResolver::new();
        match resolver.resolve(session, &modal, config).await? {
            ChallengeOutcome::Resolved => {
                log_phase(RunPhase::Submit);
                renewal::submit(session, &modal, config).await?;
                sink.capture(session, "after_submit").await;
                return Ok(());
            }
            ChallengeOutcome::FailedTimeout => {
                sink.capture(session, &format!("challenge_timeout_attempt_{attempt}"))
                    .await;
                if attempt == config.attempts {
                    warn!(
                        "run: challenge unresolved after {} attempts (expiry {})",
                        config.attempts, old_expiry
                    );
                    return Err(Error::Timeout(format!(
                        "challenge resolution after {} attempts",
                        config.attempts
                    )));
                }
                let pause = backoff
                    .next_backoff()
                    .unwrap_or_else(|| Duration::from_secs(5));
                warn!(
                    "run: attempt {}/{} failed — backing off {:.0}s",
                    attempt,
                    config.attempts,
                    pause.as_secs_f64()
                );
                tokio::time::sleep(pause).await;
            }
        }
    }
    unreachable!("attempt loop returns on the final attempt");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn summaries_carry_both_expiries() {
        let r = RunResult::success(d("2026-08-09"), d("2026-09-09"));
        let s = r.summary();
        assert!(s.contains("2026-08-09") && s.contains("2026-09-09"));

        let r = RunResult::skipped(Some(d("2026-08-13")), "expiry 5 days out".into());
        assert!(r.summary().contains("5 days out"));

        let err = Error::Timeout("challenge resolution after 3 attempts".into());
        let r = RunResult::failed(&err, Some(d("2026-08-09")));
        assert!(r.summary().contains("3 attempts"));
    }

    #[test]
    fn result_serializes_with_snake_case_status() {
        let r = RunResult::success(d("2026-08-09"), d("2026-09-09"));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["old_expiry"], "2026-08-09");
        assert_eq!(json["new_expiry"], "2026-09-09");
        assert!(json.get("error_detail").is_none());
    }

    #[test]
    fn failed_result_keeps_the_error_detail() {
        let err = Error::Auth(crate::error::AuthFailure::CookieRejected);
        let r = RunResult::failed(&err, None);
        assert_eq!(r.status, RunStatus::Failed);
        assert!(r.error_detail.as_deref().unwrap().contains("cookie_rejected"));
    }
}
