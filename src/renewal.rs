//! Renewal trigger — find the action control, open the confirmation modal,
//! submit it.
//!
//! The control is located by exact text match first; a prefix match is only
//! a fallback. Dashboards routinely carry several "Renew…" labels ("Renew
//! plan", "Renew domain"), and a contains-match has picked the wrong one
//! before.

use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::poll;

/// Marker attribute set on the located control so it can be clicked through
/// a plain CSS selector afterwards.
const ACTION_MARKER: &str = "data-renew-action";

/// Handle to an open confirmation modal. Carries the selectors the resolver
/// and submitter scope themselves to.
#[derive(Debug, Clone)]
pub struct Modal {
    pub container: String,
    pub submit: String,
}

/// Locate and activate the renewal control, then wait for the confirmation
/// modal to reach its shown state.
pub async fn open_confirmation(session: &BrowserSession, config: &Config) -> Result<Modal> {
    let mark_js = format!(
        r#"(() => {{
            const label = {label};
            document.querySelectorAll('[{marker}]').forEach(el => el.removeAttribute('{marker}'));
            const controls = Array.from(document.querySelectorAll("button, a.btn, input[type='submit']"));
            const text = el => (el.textContent || el.value || '').trim();
            let target = controls.find(el => text(el) === label);
            let how = 'exact';
            if (!target) {{
                target = controls.find(el => text(el).startsWith(label));
                how = 'prefix';
            }}
            if (!target) return '';
            target.setAttribute('{marker}', '1');
            return how;
        }})()"#,
        label = serde_json::to_string(&config.renew_label).unwrap_or_else(|_| "\"Renew\"".into()),
        marker = ACTION_MARKER,
    );

    let how = session.eval_string(&mark_js).await.map_err(Error::Browser)?;
    match how.as_str() {
        "exact" => info!("renewal: located '{}' control (exact match)", config.renew_label),
        "prefix" => warn!(
            "renewal: no exact '{}' control — using prefix match",
            config.renew_label
        ),
        _ => {
            return Err(Error::ElementNotFound(format!(
                "no control labelled '{}'",
                config.renew_label
            )))
        }
    }

    session.click(&format!("[{ACTION_MARKER}]")).await?;

    let shown_js = modal_shown_js(&config.modal_selector);
    let shown: &str = &shown_js;
    poll::until(
        "confirmation modal",
        config.modal_timeout,
        poll::DEFAULT_INTERVAL,
        move || async move { session.eval_bool(shown).await },
    )
    .await?;
    info!("renewal: confirmation modal shown");

    Ok(Modal {
        container: config.modal_selector.clone(),
        submit: format!("{} button.btn-primary[type='submit']", config.modal_selector),
    })
}

/// Wait for the modal's submit control to become interactable, then activate
/// it. A control that never materializes is a page-structure deviation, not
/// a slow load.
pub async fn submit(session: &BrowserSession, modal: &Modal, config: &Config) -> Result<()> {
    let ready_js = format!(
        r#"(() => {{
            const b = document.querySelector({sel});
            return !!b && !b.disabled && b.offsetParent !== null;
        }})()"#,
        sel = serde_json::to_string(&modal.submit).unwrap(),
    );

    let ready: &str = &ready_js;
    let readiness = poll::until(
        "submit control",
        config.modal_timeout,
        poll::DEFAULT_INTERVAL,
        move || async move { session.eval_bool(ready).await },
    )
    .await;
    if readiness.is_err() {
        return Err(Error::ElementNotFound(modal.submit.clone()));
    }

    session.click(&modal.submit).await?;
    info!("renewal: confirmation submitted");
    Ok(())
}

fn modal_shown_js(container: &str) -> String {
    format!(
        r#"(() => {{
            const m = document.querySelector({sel});
            if (!m) return false;
            if (m.classList.contains('show')) return true;
            const s = window.getComputedStyle(m);
            return s.display !== 'none' && s.visibility !== 'hidden';
        }})()"#,
        sel = serde_json::to_string(container).unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modal_handle_scopes_submit_to_container() {
        let modal = Modal {
            container: "#renew-modal".into(),
            submit: "#renew-modal button.btn-primary[type='submit']".into(),
        };
        assert!(modal.submit.starts_with(&modal.container));
    }

    #[test]
    fn shown_js_embeds_the_selector_safely() {
        let js = modal_shown_js("#renew-modal");
        assert!(js.contains("\"#renew-modal\""));
        // Selectors with quotes must not break out of the string literal.
        let js = modal_shown_js("div[data-name=\"renew\"]");
        assert!(js.contains("\\\"renew\\\""));
    }
}
