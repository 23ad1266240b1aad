//! Outcome verification — did the renewal actually take effect?
//!
//! A click that "worked" proves nothing; the only evidence is the expiry
//! moving forward. The backend is eventually consistent, so an unchanged
//! read gets exactly one more reload-and-reread before the run is declared
//! failed. Persistent lag is reported, never retried indefinitely; a silent
//! no-op "success" is the worst outcome this tool could produce.

use chrono::NaiveDate;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::diagnostics::DiagnosticsSink;
use crate::error::{Error, Result};
use crate::resource;

/// Grace before the second-chance reread, giving the backend a moment to
/// settle.
const SECOND_CHANCE_DELAY: Duration = Duration::from_secs(3);

/// Re-read the resource and confirm `new_expiry > old_expiry`.
pub async fn verify(
    session: &BrowserSession,
    old_expiry: NaiveDate,
    config: &Config,
    sink: &DiagnosticsSink,
) -> Result<NaiveDate> {
    let first = reread(session, config).await?;
    if let Some(confirmed) = judge(old_expiry, first) {
        return Ok(confirmed);
    }

    warn!(
        "verify: expiry still {} after submission — second-chance reread",
        old_expiry
    );
    tokio::time::sleep(SECOND_CHANCE_DELAY).await;

    let second = reread(session, config).await?;
    if let Some(confirmed) = judge(old_expiry, second) {
        return Ok(confirmed);
    }

    sink.capture(session, "verification_failed").await;
    Err(Error::Verification {
        old: old_expiry.to_string(),
        new: second.to_string(),
    })
}

async fn reread(session: &BrowserSession, config: &Config) -> Result<NaiveDate> {
    session.goto(&config.resource_url(), config.nav_timeout).await?;
    let state = resource::read_state_from_current_page(session, config).await?;
    Ok(state.expiry)
}

/// `Some(new)` when the expiry has advanced; `None` when unchanged.
/// A date that moved *backwards* is treated as unchanged for the retry
/// decision; it will fail verification either way.
fn judge(old: NaiveDate, new: NaiveDate) -> Option<NaiveDate> {
    if new > old {
        info!("verify: expiry advanced {} → {}", old, new);
        Some(new)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn advanced_expiry_passes() {
        assert_eq!(
            judge(d("2026-08-09"), d("2026-09-09")),
            Some(d("2026-09-09"))
        );
        // Even a single day forward counts.
        assert_eq!(
            judge(d("2026-08-09"), d("2026-08-10")),
            Some(d("2026-08-10"))
        );
    }

    #[test]
    fn unchanged_expiry_does_not_pass() {
        assert_eq!(judge(d("2026-08-09"), d("2026-08-09")), None);
    }

    #[test]
    fn regressed_expiry_does_not_pass() {
        assert_eq!(judge(d("2026-08-09"), d("2026-08-01")), None);
    }
}
