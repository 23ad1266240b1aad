//! Challenge resolver — detect, trigger, and wait out the bot-challenge
//! widget embedded in the confirmation modal.
//!
//! The widget itself is an opaque third-party frame; this module never tries
//! to solve anything. It drives a forward-only state machine
//! (`Absent → Present → Interacting → Resolved | FailedTimeout`) with one
//! hard rule: at most one activation per attempt. Re-clicking a widget while
//! its server-side verification is in flight invalidates the token, so a
//! timeout is reported upward instead of retried in place.

use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::error::Error;
use crate::poll;
use crate::renewal::Modal;

/// Terminal result of one resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Resolved,
    FailedTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengePhase {
    Absent,
    Present,
    Interacting,
    Resolved,
    FailedTimeout,
}

/// The resolution state machine, separated from the browser so the
/// transition rules are enforceable (and testable) on their own.
#[derive(Debug)]
pub struct ChallengeState {
    phase: ChallengePhase,
    activations: u32,
}

impl ChallengeState {
    pub fn new() -> Self {
        Self {
            phase: ChallengePhase::Absent,
            activations: 0,
        }
    }

    pub fn phase(&self) -> ChallengePhase {
        self.phase
    }

    pub fn activations(&self) -> u32 {
        self.activations
    }

    pub fn observe_present(&mut self) {
        if self.phase == ChallengePhase::Absent {
            self.phase = ChallengePhase::Present;
        }
    }

    /// Request permission to activate the widget. Grants exactly once, and
    /// only from `Present`; activation after `Resolved` is forbidden.
    pub fn try_activate(&mut self) -> bool {
        if self.phase == ChallengePhase::Present {
            self.phase = ChallengePhase::Interacting;
            self.activations += 1;
            true
        } else {
            false
        }
    }

    /// A success signal was observed (or the widget was never required).
    /// `FailedTimeout` is terminal; transitions only move forward.
    pub fn complete(&mut self) {
        match self.phase {
            ChallengePhase::Absent | ChallengePhase::Present | ChallengePhase::Interacting => {
                self.phase = ChallengePhase::Resolved;
            }
            ChallengePhase::Resolved | ChallengePhase::FailedTimeout => {}
        }
    }

    pub fn fail(&mut self) {
        match self.phase {
            ChallengePhase::Present | ChallengePhase::Interacting => {
                self.phase = ChallengePhase::FailedTimeout;
            }
            _ => {}
        }
    }

    pub fn outcome(&self) -> Option<ChallengeOutcome> {
        match self.phase {
            ChallengePhase::Resolved => Some(ChallengeOutcome::Resolved),
            ChallengePhase::FailedTimeout => Some(ChallengeOutcome::FailedTimeout),
            _ => None,
        }
    }
}

impl Default for ChallengeState {
    fn default() -> Self {
        Self::new()
    }
}

/// One resolver per renewal attempt; a fresh modal gets a fresh widget and
/// therefore a fresh state machine.
pub struct ChallengeResolver {
    state: ChallengeState,
}

impl ChallengeResolver {
    pub fn new() -> Self {
        Self {
            state: ChallengeState::new(),
        }
    }

    pub fn state(&self) -> &ChallengeState {
        &self.state
    }

    /// Run the detect → interact → wait sequence against the open modal.
    ///
    /// Idempotent: calling again after `Resolved` performs no further
    /// interaction and returns `Resolved` immediately.
    pub async fn resolve(
        &mut self,
        session: &BrowserSession,
        modal: &Modal,
        config: &Config,
    ) -> crate::error::Result<ChallengeOutcome> {
        if let Some(outcome) = self.state.outcome() {
            return Ok(outcome);
        }

        // Detect: no widget inside the modal within the grace window is a
        // valid success path; low-risk sessions are not challenged at all.
        let present_js = challenge_present_js(&modal.container);
        let present: &str = &present_js;
        let detected = poll::until(
            "challenge widget detection",
            config.challenge_detect_timeout,
            poll::DEFAULT_INTERVAL,
            move || async move { session.eval_bool(present).await },
        )
        .await;
        if detected.is_err() {
            info!("challenge: no widget appeared — session not challenged");
            self.state.complete();
            return Ok(ChallengeOutcome::Resolved);
        }
        self.state.observe_present();
        info!("challenge: widget present in modal");

        // Interact: one coordinate click near the widget's checkbox region.
        // The frame is cross-origin, so no same-document element exists to
        // target; the raw click is the only affordance we have.
        if self.state.try_activate() {
            match widget_box(session, &modal.container).await {
                Ok(Some((x, y, w, h))) => {
                    let cx = x + (w / 2.0).min(28.0);
                    let cy = y + h / 2.0;
                    if let Err(e) = session.click_at(cx, cy).await {
                        warn!("challenge: activation click failed: {}", e);
                    } else {
                        info!("challenge: widget activated at ({:.0}, {:.0})", cx, cy);
                    }
                }
                Ok(None) => warn!("challenge: widget vanished before activation"),
                Err(e) => warn!("challenge: could not measure widget: {}", e),
            }
        }

        // Wait: any of the equivalent success signals ends the attempt.
        // Server-side risk scoring can take a while, hence the long budget.
        let success_js = challenge_success_js(&modal.container);
        let success: &str = &success_js;
        let resolved = poll::until(
            "challenge resolution signal",
            config.challenge_resolve_timeout,
            poll::DEFAULT_INTERVAL,
            move || async move { session.eval_bool(success).await },
        )
        .await;

        match resolved {
            Ok(elapsed) => {
                info!("challenge: resolved after {}ms", elapsed.as_millis());
                self.state.complete();
                Ok(ChallengeOutcome::Resolved)
            }
            Err(Error::Timeout(_)) => {
                warn!(
                    "challenge: no resolution signal within {}s",
                    config.challenge_resolve_timeout.as_secs()
                );
                self.state.fail();
                Ok(ChallengeOutcome::FailedTimeout)
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for ChallengeResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Viewport box of the widget frame: `(left, top, width, height)`.
async fn widget_box(
    session: &BrowserSession,
    container: &str,
) -> anyhow::Result<Option<(f64, f64, f64, f64)>> {
    let js = format!(
        r#"(() => {{
            const scope = document.querySelector({sel}) || document;
            const f = scope.querySelector({frames});
            if (!f) return '';
            f.scrollIntoView({{block: 'center'}});
            const r = f.getBoundingClientRect();
            return JSON.stringify({{x: r.left, y: r.top, w: r.width, h: r.height}});
        }})()"#,
        sel = serde_json::to_string(container).unwrap(),
        frames = serde_json::to_string(CHALLENGE_FRAME_SELECTOR).unwrap(),
    );
    let raw = session.eval_string(&js).await?;
    if raw.is_empty() {
        return Ok(None);
    }
    let v: serde_json::Value = serde_json::from_str(&raw)?;
    let get = |k: &str| v.get(k).and_then(|n| n.as_f64()).unwrap_or(0.0);
    Ok(Some((get("x"), get("y"), get("w"), get("h"))))
}

const CHALLENGE_FRAME_SELECTOR: &str = "iframe[src*='challenges.cloudflare.com'], iframe[title*='Cloudflare'], iframe[src*='turnstile'], .cf-turnstile iframe";

fn challenge_present_js(container: &str) -> String {
    format!(
        r#"(() => {{
            const scope = document.querySelector({sel}) || document;
            return !!scope.querySelector({frames});
        }})()"#,
        sel = serde_json::to_string(container).unwrap(),
        frames = serde_json::to_string(CHALLENGE_FRAME_SELECTOR).unwrap(),
    )
}

/// Success is any of:
/// 1. the hidden response-token input carrying a plausibly-long value,
/// 2. the widget frame detached from the document,
/// 3. a visible success icon (same-origin frames only; cross-origin
///    documents are unreadable and are covered by the other two signals).
fn challenge_success_js(container: &str) -> String {
    format!(
        r#"(() => {{
            const scope = document.querySelector({sel}) || document;
            const token = scope.querySelector("input[name='cf-turnstile-response'], input[name='g-recaptcha-response']");
            if (token && token.value && token.value.length >= 20) return true;
            const f = scope.querySelector({frames});
            if (!f) return true;
            try {{
                const doc = f.contentDocument;
                if (doc && doc.querySelector('.ctp-icon-checkmark, #success-icon, .success')) return true;
            }} catch (e) {{}}
            return false;
        }})()"#,
        sel = serde_json::to_string(container).unwrap(),
        frames = serde_json::to_string(CHALLENGE_FRAME_SELECTOR).unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_widget_resolves_without_activation() {
        let mut s = ChallengeState::new();
        s.complete();
        assert_eq!(s.outcome(), Some(ChallengeOutcome::Resolved));
        assert_eq!(s.activations(), 0);
    }

    #[test]
    fn activation_is_granted_exactly_once() {
        let mut s = ChallengeState::new();
        s.observe_present();
        assert!(s.try_activate());
        assert!(!s.try_activate());
        assert_eq!(s.activations(), 1);
    }

    #[test]
    fn activation_after_resolved_is_forbidden() {
        let mut s = ChallengeState::new();
        s.observe_present();
        assert!(s.try_activate());
        s.complete();
        assert!(!s.try_activate());
        assert_eq!(s.outcome(), Some(ChallengeOutcome::Resolved));
        assert_eq!(s.activations(), 1);
    }

    #[test]
    fn transitions_are_forward_only() {
        let mut s = ChallengeState::new();
        s.observe_present();
        s.try_activate();
        s.fail();
        assert_eq!(s.outcome(), Some(ChallengeOutcome::FailedTimeout));
        // Terminal: a late success signal cannot resurrect the attempt.
        s.complete();
        assert_eq!(s.outcome(), Some(ChallengeOutcome::FailedTimeout));
        // Nor can presence re-observation regress the phase.
        s.observe_present();
        assert_eq!(s.phase(), ChallengePhase::FailedTimeout);
    }

    #[test]
    fn activation_without_presence_is_refused() {
        let mut s = ChallengeState::new();
        assert!(!s.try_activate());
        assert_eq!(s.activations(), 0);
    }

    #[test]
    fn success_predicate_scopes_to_the_modal() {
        let js = challenge_success_js("#renew-modal");
        assert!(js.contains("\"#renew-modal\""));
        assert!(js.contains("cf-turnstile-response"));
        assert!(js.contains("length >= 20"));
    }
}
