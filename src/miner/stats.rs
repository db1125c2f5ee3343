// Beamline Miner - Free and Open Source Software Statement
//
// File: src/miner/stats.rs
// Version: 1.1.0
//
// Per-tick solution-rate sampling over the lanes' rolling counters.

use crate::miner::lane::LaneControl;

/// Solution rates over one sampling interval, in sol/s.
#[derive(Debug, Clone, PartialEq)]
pub struct RateReport {
    pub per_lane: Vec<f64>,
    pub total: f64,
}

/// Sample every lane's rolling counter (read-and-reset) into per-lane and
/// aggregate rates. Counts accumulated during the interval are consumed, so
/// consecutive samples never double-report.
pub fn sample_rates<'a, I>(controls: I, interval_secs: f64) -> RateReport
where
    I: IntoIterator<Item = &'a LaneControl>,
{
    let mut per_lane = Vec::new();
    let mut total = 0.0;
    for control in controls {
        let rate = control.take_solutions() as f64 / interval_secs;
        total += rate;
        per_lane.push(rate);
    }
    RateReport { per_lane, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rates_read_and_reset() {
        let a = LaneControl::new();
        let b = LaneControl::new();
        a.record_solutions(30);
        b.record_solutions(15);

        let report = sample_rates([&a, &b], 15.0);
        assert_eq!(report.per_lane, vec![2.0, 1.0]);
        assert_eq!(report.total, 3.0);

        // A second sample over an empty interval reports zero.
        let report = sample_rates([&a, &b], 15.0);
        assert_eq!(report.total, 0.0);
    }
}
