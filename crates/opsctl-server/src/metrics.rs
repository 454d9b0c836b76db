//! In-process metrics with Prometheus text exposition.
//!
//! Tracked series:
//! - `opsctl_action_runs_total{action,status}` counter
//! - `opsctl_action_duration_seconds{action}` histogram
//! - `opsctl_actions_in_progress` gauge
//! - `opsctl_http_requests_total{method,path,status}` counter

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use opsctl_core::run::RunStatus;

/// Upper bounds (seconds) of the duration histogram buckets.
pub const DURATION_BUCKETS: [f64; 10] = [0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0, 300.0];

#[derive(Debug, Clone, Default)]
struct Histogram {
    /// Non-cumulative count per bucket; cumulated at render time.
    buckets: [u64; DURATION_BUCKETS.len()],
    sum: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        if let Some(i) = DURATION_BUCKETS.iter().position(|&b| value <= b) {
            self.buckets[i] += 1;
        }
        self.sum += value;
        self.count += 1;
    }
}

#[derive(Debug, Default)]
struct Series {
    runs_total: BTreeMap<(String, &'static str), u64>,
    durations: BTreeMap<String, Histogram>,
    http_requests: BTreeMap<(String, String, u16), u64>,
}

#[derive(Debug, Default)]
pub struct Metrics {
    series: Mutex<Series>,
    in_progress: AtomicI64,
}

/// Holds the in-progress gauge up for as long as it lives.
#[must_use = "the gauge is released when the guard is dropped"]
pub struct InProgressGuard<'a> {
    metrics: &'a Metrics,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.metrics.in_progress.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the in-progress gauge; it drops back when the guard does,
    /// on every exit path.
    pub fn start_run(&self) -> InProgressGuard<'_> {
        self.in_progress.fetch_add(1, Ordering::AcqRel);
        InProgressGuard { metrics: self }
    }

    /// Record a finished run: one status count and one duration sample.
    pub fn observe_run(&self, action: &str, status: RunStatus, duration_seconds: f64) {
        let mut series = self.series();
        *series
            .runs_total
            .entry((action.to_string(), status.as_str()))
            .or_insert(0) += 1;
        series
            .durations
            .entry(action.to_string())
            .or_default()
            .observe(duration_seconds);
    }

    pub fn observe_http(&self, method: &str, path: &str, status: u16) {
        *self
            .series()
            .http_requests
            .entry((method.to_string(), path.to_string(), status))
            .or_insert(0) += 1;
    }

    pub fn in_progress(&self) -> i64 {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn run_count(&self, action: &str, status: RunStatus) -> u64 {
        self.series()
            .runs_total
            .get(&(action.to_string(), status.as_str()))
            .copied()
            .unwrap_or(0)
    }

    /// Total runs observed for `action`, any status.
    pub fn total_runs(&self, action: &str) -> u64 {
        self.series()
            .runs_total
            .iter()
            .filter(|((a, _), _)| a == action)
            .map(|(_, n)| *n)
            .sum()
    }

    pub fn http_count(&self, method: &str, path: &str, status: u16) -> u64 {
        self.series()
            .http_requests
            .get(&(method.to_string(), path.to_string(), status))
            .copied()
            .unwrap_or(0)
    }

    /// Render every series in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let series = self.series();
        let mut out = String::new();

        out.push_str("# HELP opsctl_action_runs_total Finished action runs by outcome.\n");
        out.push_str("# TYPE opsctl_action_runs_total counter\n");
        for ((action, status), n) in &series.runs_total {
            let _ = writeln!(
                out,
                "opsctl_action_runs_total{{action=\"{}\",status=\"{}\"}} {n}",
                escape(action),
                status
            );
        }

        out.push_str("# HELP opsctl_action_duration_seconds Wall-clock duration of action runs.\n");
        out.push_str("# TYPE opsctl_action_duration_seconds histogram\n");
        for (action, h) in &series.durations {
            let action = escape(action);
            let mut cumulative = 0;
            for (bound, n) in DURATION_BUCKETS.iter().zip(h.buckets.iter()) {
                cumulative += n;
                let _ = writeln!(
                    out,
                    "opsctl_action_duration_seconds_bucket{{action=\"{action}\",le=\"{bound}\"}} {cumulative}"
                );
            }
            let _ = writeln!(
                out,
                "opsctl_action_duration_seconds_bucket{{action=\"{action}\",le=\"+Inf\"}} {}",
                h.count
            );
            let _ = writeln!(
                out,
                "opsctl_action_duration_seconds_sum{{action=\"{action}\"}} {}",
                h.sum
            );
            let _ = writeln!(
                out,
                "opsctl_action_duration_seconds_count{{action=\"{action}\"}} {}",
                h.count
            );
        }

        out.push_str("# HELP opsctl_actions_in_progress Action runs currently executing.\n");
        out.push_str("# TYPE opsctl_actions_in_progress gauge\n");
        let _ = writeln!(out, "opsctl_actions_in_progress {}", self.in_progress());

        out.push_str("# HELP opsctl_http_requests_total HTTP requests by route and status.\n");
        out.push_str("# TYPE opsctl_http_requests_total counter\n");
        for ((method, path, status), n) in &series.http_requests {
            let _ = writeln!(
                out,
                "opsctl_http_requests_total{{method=\"{}\",path=\"{}\",status=\"{status}\"}} {n}",
                escape(method),
                escape(path)
            );
        }

        out
    }

    // Counters stay consistent even if a holder panicked, so poisoning is ignored.
    fn series(&self) -> MutexGuard<'_, Series> {
        self.series.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn escape(label: &str) -> String {
    label
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', r"\n")
}
