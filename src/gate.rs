//! Scheduling gate — should this run act at all?
//!
//! Policy: renew exactly one calendar day before expiry. Earlier attempts
//! waste the renewal window (some backends reject them outright); the exact
//! `== 1` comparison rather than `<= 1` is a recorded policy decision: a
//! run missed on the critical day stays missed until the next cycle and is
//! recovered manually with `--force`.

use chrono::NaiveDate;
use tracing::info;

/// True iff `expiry` is exactly one day after `today` (calendar dates, not
/// timestamps; a 23:59 run and a 00:01 run on the same date agree).
pub fn should_act(expiry: NaiveDate, today: NaiveDate) -> bool {
    (expiry - today).num_days() == 1
}

/// Gate decision with the delta kept around for logging and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Act,
    Skip { delta_days: i64 },
}

pub fn decide(expiry: NaiveDate, today: NaiveDate, force: bool) -> GateDecision {
    let delta_days = (expiry - today).num_days();
    if force {
        info!("gate: force mode — bypassing schedule (delta {} days)", delta_days);
        return GateDecision::Act;
    }
    if should_act(expiry, today) {
        info!("gate: expiry {} is tomorrow — acting", expiry);
        GateDecision::Act
    } else {
        info!(
            "gate: expiry {} is {} day(s) out — skipping",
            expiry, delta_days
        );
        GateDecision::Skip { delta_days }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn acts_only_on_the_day_before_expiry() {
        let today = d("2026-08-08");
        assert!(should_act(d("2026-08-09"), today));
        assert!(!should_act(d("2026-08-08"), today)); // expires today: too late
        assert!(!should_act(d("2026-08-10"), today)); // two days out: too early
        assert!(!should_act(d("2026-08-13"), today));
        assert!(!should_act(d("2026-08-07"), today)); // already expired
    }

    #[test]
    fn exhaustive_window_sweep() {
        let today = d("2026-08-08");
        for offset in -30i64..=30 {
            let expiry = today + Duration::days(offset);
            assert_eq!(should_act(expiry, today), offset == 1, "offset {offset}");
        }
    }

    #[test]
    fn force_bypasses_the_schedule() {
        let today = d("2026-08-08");
        assert_eq!(decide(d("2026-08-20"), today, true), GateDecision::Act);
        assert_eq!(
            decide(d("2026-08-20"), today, false),
            GateDecision::Skip { delta_days: 12 }
        );
    }

    #[test]
    fn month_and_year_boundaries() {
        assert!(should_act(d("2026-09-01"), d("2026-08-31")));
        assert!(should_act(d("2027-01-01"), d("2026-12-31")));
    }
}
