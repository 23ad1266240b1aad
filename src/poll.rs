//! Bounded polling — the one wait primitive used everywhere.
//!
//! Every wait in the workflow is a poll with an explicit deadline; nothing
//! blocks unbounded. Callers get back how long the wait took so timeouts can
//! be logged with real numbers.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Default gap between predicate evaluations.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Poll `predicate` every `interval` until it returns `true` or `timeout`
/// elapses. Predicate errors are treated as "not yet": transient CDP
/// evaluation failures during navigation are expected and must not abort the
/// wait.
///
/// Returns the elapsed time on success, `Error::Timeout(what)` otherwise.
pub async fn until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<Duration>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let start = Instant::now();
    loop {
        match predicate().await {
            Ok(true) => return Ok(start.elapsed()),
            Ok(false) => {}
            Err(e) => {
                tracing::debug!("poll: {} predicate error (treated as pending): {}", what, e);
            }
        }
        if start.elapsed() >= timeout {
            return Err(Error::Timeout(format!(
                "{} ({}ms budget exhausted)",
                what,
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(interval).await;
    }
}
