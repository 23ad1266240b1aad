//! Resource state — the observed expiry of the target resource.
//!
//! The dashboard renders the expiry as free text near an "Expiry"/"Expires"
//! label. Reading happens in two stages: a DOM text grab (configured selector
//! when set, page body otherwise) and a Rust-side extraction that anchors on
//! the label and understands the three date shapes the panel has been seen
//! to use.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceState {
    pub expiry: NaiveDate,
}

/// Navigate to the resource page and read its current state.
pub async fn read_state(session: &BrowserSession, config: &Config) -> Result<ResourceState> {
    session.goto(&config.resource_url(), config.nav_timeout).await?;
    read_state_from_current_page(session, config).await
}

/// Read the state from whatever page is currently loaded (used by the
/// verifier after a reload, where navigation already happened).
pub async fn read_state_from_current_page(
    session: &BrowserSession,
    config: &Config,
) -> Result<ResourceState> {
    let text = session.read_text(&config.expiry_selector).await?;
    let expiry = extract_expiry(&text).ok_or_else(|| {
        Error::ElementNotFound(format!(
            "no expiry date found on {} ({} chars of text scanned)",
            config.resource_url(),
            text.len()
        ))
    })?;
    debug!("resource: observed expiry {}", expiry);
    Ok(ResourceState { expiry })
}

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap())
}

fn slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap())
}

fn month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\.?\s+(\d{1,2}),?\s+(\d{4})\b",
        )
        .unwrap()
    })
}

/// Extract the expiry date from page text.
///
/// Prefers the first date within 120 characters after an "expir…" label so a
/// creation date elsewhere on the page cannot shadow it; falls back to the
/// first date anywhere when no label is present (dedicated-selector reads).
pub fn extract_expiry(text: &str) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    if let Some(pos) = lower.find("expir") {
        let window_end = (pos + 120).min(text.len());
        // Clamp to a char boundary; the label itself is ASCII but the page
        // text around it may not be.
        let mut end = window_end;
        while !text.is_char_boundary(end) {
            end += 1;
        }
        if let Some(date) = first_date(&text[pos..end]) {
            return Some(date);
        }
    }
    first_date(text)
}

fn first_date(text: &str) -> Option<NaiveDate> {
    // Earliest match across all three shapes wins.
    let mut best: Option<(usize, NaiveDate)> = None;
    let mut consider = |at: usize, date: Option<NaiveDate>| {
        if let Some(d) = date {
            if best.map(|(b, _)| at < b).unwrap_or(true) {
                best = Some((at, d));
            }
        }
    };

    if let Some(c) = iso_re().captures(text) {
        let m = c.get(0).unwrap();
        let date = NaiveDate::from_ymd_opt(
            c[1].parse().ok()?,
            c[2].parse().ok()?,
            c[3].parse().ok()?,
        );
        consider(m.start(), date);
    }
    if let Some(c) = slash_re().captures(text) {
        let m = c.get(0).unwrap();
        let a: u32 = c[1].parse().ok()?;
        let b: u32 = c[2].parse().ok()?;
        let y: i32 = c[3].parse().ok()?;
        // Day-first by default; fall back to month-first when day-first is
        // impossible (e.g. 08/25/2026).
        let date = NaiveDate::from_ymd_opt(y, b, a).or_else(|| NaiveDate::from_ymd_opt(y, a, b));
        consider(m.start(), date);
    }
    if let Some(c) = month_re().captures(text) {
        let m = c.get(0).unwrap();
        let month = month_number(&c[1]);
        let date = month.and_then(|mo| {
            NaiveDate::from_ymd_opt(c[3].parse().ok()?, mo, c[2].parse().ok()?)
        });
        consider(m.start(), date);
    }

    best.map(|(_, d)| d)
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name.to_lowercase().as_str() {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => return None,
    };
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn iso_date() {
        assert_eq!(extract_expiry("Expiry: 2026-08-09"), Some(d("2026-08-09")));
    }

    #[test]
    fn slash_date_day_first() {
        assert_eq!(extract_expiry("Expires 09/08/2026"), Some(d("2026-08-09")));
    }

    #[test]
    fn slash_date_month_first_fallback() {
        // 25 cannot be a month, so the month-first reading applies.
        assert_eq!(extract_expiry("Expires 08/25/2026"), Some(d("2026-08-25")));
    }

    #[test]
    fn month_name_dates() {
        assert_eq!(
            extract_expiry("Expiration date: August 9, 2026"),
            Some(d("2026-08-09"))
        );
        assert_eq!(extract_expiry("expires Aug 9 2026"), Some(d("2026-08-09")));
    }

    #[test]
    fn label_anchoring_beats_earlier_dates() {
        let text = "Created: 2026-01-15\nPlan: basic\nExpiry: 2026-08-09\nRenewed 3 times";
        assert_eq!(extract_expiry(text), Some(d("2026-08-09")));
    }

    #[test]
    fn falls_back_to_first_date_without_label() {
        assert_eq!(extract_expiry("valid until 2026-08-09"), Some(d("2026-08-09")));
    }

    #[test]
    fn no_date_yields_none() {
        assert_eq!(extract_expiry("Expiry: pending"), None);
        assert_eq!(extract_expiry(""), None);
    }

    #[test]
    fn impossible_calendar_dates_are_rejected() {
        assert_eq!(extract_expiry("Expiry: 2026-13-40"), None);
    }

    #[test]
    fn label_window_without_date_falls_back_to_body() {
        let text = "Expiry shown below after load.\n\n\n…\nDue 2026-08-09";
        assert_eq!(extract_expiry(text), Some(d("2026-08-09")));
    }
}
