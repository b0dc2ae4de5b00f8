//! Health check history: a bounded rolling window over `Manager::init_side`
//! probe outcomes, tracking response-time extremes and a running average
//! the way a long-lived process would want before exposing a health
//! endpoint — as opposed to `PoolHealth`, which is a point-in-time snapshot
//! of pool occupancy only.

use std::collections::VecDeque;
use std::time::Duration;

use pgschema_diff_types::HealthSummary;

const MAX_HISTORY: usize = 100;

struct HealthRecord {
    healthy: bool,
    response_time_ms: u64,
}

/// Not `Clone`: held behind a `tokio::sync::Mutex` in `Manager` and mutated
/// in place as checks come in.
#[derive(Default)]
pub struct HealthHistory {
    records: VecDeque<HealthRecord>,
}

impl HealthHistory {
    pub fn new() -> Self {
        Self { records: VecDeque::with_capacity(MAX_HISTORY) }
    }

    pub fn record(&mut self, healthy: bool, elapsed: Duration) {
        if self.records.len() == MAX_HISTORY {
            self.records.pop_front();
        }
        self.records.push_back(HealthRecord {
            healthy,
            response_time_ms: elapsed.as_millis() as u64,
        });
    }

    pub fn summary(&self) -> HealthSummary {
        if self.records.is_empty() {
            return HealthSummary::default();
        }
        let total_checks = self.records.len() as u32;
        let successful_checks = self.records.iter().filter(|r| r.healthy).count() as u32;
        let failed_checks = total_checks - successful_checks;
        let sum: u64 = self.records.iter().map(|r| r.response_time_ms).sum();
        let longest_response_time_ms = self.records.iter().map(|r| r.response_time_ms).max().unwrap_or(0);
        let shortest_response_time_ms = self.records.iter().map(|r| r.response_time_ms).min().unwrap_or(0);
        HealthSummary {
            total_checks,
            successful_checks,
            failed_checks,
            average_response_time_ms: sum as f64 / total_checks as f64,
            longest_response_time_ms,
            shortest_response_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_an_empty_history_is_all_zeros() {
        assert_eq!(HealthHistory::new().summary(), HealthSummary::default());
    }

    #[test]
    fn tracks_counts_and_response_time_extremes() {
        let mut history = HealthHistory::new();
        history.record(true, Duration::from_millis(10));
        history.record(false, Duration::from_millis(50));
        history.record(true, Duration::from_millis(20));

        let summary = history.summary();
        assert_eq!(summary.total_checks, 3);
        assert_eq!(summary.successful_checks, 2);
        assert_eq!(summary.failed_checks, 1);
        assert_eq!(summary.longest_response_time_ms, 50);
        assert_eq!(summary.shortest_response_time_ms, 10);
        assert!((summary.average_response_time_ms - (80.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn older_entries_are_evicted_past_the_window() {
        let mut history = HealthHistory::new();
        for _ in 0..150 {
            history.record(true, Duration::from_millis(1));
        }
        assert_eq!(history.summary().total_checks, 100);
    }
}
