//! Rebalance calendar over the session axis.

use chrono::{Datelike, NaiveDate};

use crate::config::RebalanceFrequency;

/// Flag each session in `dates[start..=end]` as a rebalance day.
///
/// The returned vector is indexed relative to `start`. The first run session
/// always rebalances.
pub fn rebalance_flags(
    dates: &[NaiveDate],
    start: usize,
    end: usize,
    frequency: RebalanceFrequency,
) -> Vec<bool> {
    if start > end || end >= dates.len() {
        return Vec::new();
    }
    let run = &dates[start..=end];
    let mut flags = vec![false; run.len()];
    flags[0] = true;

    for i in 1..run.len() {
        let (prev, cur) = (run[i - 1], run[i]);
        flags[i] = match frequency {
            RebalanceFrequency::Weekly => cur.iso_week() != prev.iso_week(),
            RebalanceFrequency::Monthly => (cur.year(), cur.month()) != (prev.year(), prev.month()),
            RebalanceFrequency::EverySessions { sessions } => sessions > 0 && i % sessions == 0,
        };
    }

    flags
}
