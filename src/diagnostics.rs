//! Diagnostics sink — numbered screenshot checkpoints and the single
//! per-run notification.
//!
//! Screenshots land in one directory per run, named `NN_label.png` with a
//! monotone zero-padded prefix so `ls` shows the run chronologically.
//! Capture failures are logged and swallowed: diagnostics must never change
//! the outcome of a run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::run::RunResult;

pub struct DiagnosticsSink {
    dir: PathBuf,
    counter: AtomicU32,
}

impl DiagnosticsSink {
    /// Create the sink, ensuring the directory exists. A directory that
    /// cannot be created downgrades every capture to a no-op warning.
    pub fn new(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(
                "diagnostics: cannot create {} ({}) — screenshots disabled",
                dir.display(),
                e
            );
        }
        Self {
            dir: dir.to_path_buf(),
            counter: AtomicU32::new(0),
        }
    }

    /// Next checkpoint filename for `label`, e.g. `03_modal_open.png`.
    fn next_name(&self, label: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{:02}_{}.png", n, slug(label))
    }

    /// Capture a full-viewport screenshot checkpoint. Best-effort.
    pub async fn capture(&self, session: &BrowserSession, label: &str) {
        let name = self.next_name(label);
        let path = self.dir.join(&name);
        match session.screenshot_png().await {
            Ok(bytes) => match std::fs::write(&path, &bytes) {
                Ok(()) => info!("diagnostics: saved {} ({} bytes)", path.display(), bytes.len()),
                Err(e) => warn!("diagnostics: write {} failed: {}", path.display(), e),
            },
            Err(e) => warn!("diagnostics: screenshot '{}' failed: {}", label, e),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Filesystem-safe label: lowercase alphanumerics and underscores only.
fn slug(label: &str) -> String {
    let mut out: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    out.trim_matches('_').to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Notification
// ─────────────────────────────────────────────────────────────────────────────

/// Telegram notifier. Unconfigured channel degrades to a log line so every
/// run still emits exactly one summary.
pub struct Notifier {
    client: reqwest::Client,
    token: Option<String>,
    chat: Option<String>,
}

impl Notifier {
    pub fn new(token: Option<String>, chat: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            chat,
        }
    }

    /// Deliver the run summary. Called exactly once per run, success or
    /// failure. Delivery errors are logged but do not alter the exit code;
    /// a failed renewal must not be re-reported as a notification failure.
    pub async fn send(&self, result: &RunResult) {
        let text = result.summary();
        let (Some(token), Some(chat)) = (&self.token, &self.chat) else {
            info!("notify: channel not configured — {}", text);
            return;
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
        let body = serde_json::json!({ "chat_id": chat, "text": text });
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("notify: delivered run summary to telegram");
            }
            Ok(resp) => warn!("notify: telegram returned {}", resp.status()),
            Err(e) => warn!("notify: delivery failed: {}", e),
        }
    }
}
