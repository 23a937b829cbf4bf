//! Sliding-window job latency tracking for the dashboard

use std::collections::VecDeque;

use chrono::Duration;
use tileflow_core::UtcDateTime;

/// Completion latencies within a sliding wall-clock window
#[derive(Debug)]
pub struct LatencyWindow {
    window: Duration,
    /// (completion time, run duration), oldest first
    samples: VecDeque<(UtcDateTime, Duration)>,
}

impl LatencyWindow {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window: Duration::seconds(window_seconds as i64),
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, started_at: UtcDateTime, finished_at: UtcDateTime) {
        let elapsed = (finished_at - started_at).max(Duration::zero());
        self.samples.push_back((finished_at, elapsed));
        self.prune(finished_at);
    }

    /// Average latency of completions inside the window, in minutes
    ///
    /// Read-only so snapshots never mutate scheduler state; pruning happens
    /// on record.
    pub fn average_minutes(&self, now: UtcDateTime) -> f64 {
        let cutoff = now - self.window;
        let mut total_ms: i64 = 0;
        let mut count: i64 = 0;
        for (finished_at, elapsed) in &self.samples {
            if *finished_at >= cutoff {
                total_ms += elapsed.num_milliseconds();
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        (total_ms as f64 / count as f64) / 60_000.0
    }

    fn prune(&mut self, now: UtcDateTime) {
        let cutoff = now - self.window;
        while let Some((finished_at, _)) = self.samples.front() {
            if *finished_at < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
