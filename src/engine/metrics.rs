use std::{
    fmt::Write,
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::engine::models::Verdict;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    requests_total: AtomicU64,
    tests_total: AtomicU64,
    sandbox_failures_total: AtomicU64,
    queue_depth: AtomicI64,
    in_flight: AtomicI64,
    verdicts: DashMap<Verdict, AtomicU64>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, overall: Verdict) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if overall == Verdict::ConfigurationError {
            self.verdict(overall);
        }
    }

    pub fn verdict(&self, verdict: Verdict) {
        self.verdicts
            .entry(verdict)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    // Must run before the job is handed to the channel, a worker may pick it
    // up before `send` returns.
    pub fn enqueued(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enqueue_failed(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn started(&self) {
        self.tests_total.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finished(&self, ok: bool) {
        if !ok {
            self.sandbox_failures_total.fetch_add(1, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn queue_depth(&self) -> i64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut out = format!(
            concat!(
                "# TYPE judge_requests_total counter\n",
                "judge_requests_total {}\n",
                "# TYPE judge_tests_total counter\n",
                "judge_tests_total {}\n",
                "# TYPE judge_sandbox_failures_total counter\n",
                "judge_sandbox_failures_total {}\n",
                "# TYPE judge_queue_depth gauge\n",
                "judge_queue_depth {}\n",
                "# TYPE judge_sandboxes_in_flight gauge\n",
                "judge_sandboxes_in_flight {}\n",
                "# TYPE judge_verdicts_total counter\n",
            ),
            self.requests_total.load(Ordering::Relaxed),
            self.tests_total.load(Ordering::Relaxed),
            self.sandbox_failures_total.load(Ordering::Relaxed),
            self.queue_depth.load(Ordering::Relaxed),
            self.in_flight.load(Ordering::Relaxed),
        );
        for verdict in Verdict::ALL {
            let count = self
                .verdicts
                .get(&verdict)
                .map(|c| c.load(Ordering::Relaxed))
                .unwrap_or(0);
            let _ = writeln!(
                out,
                "judge_verdicts_total{{verdict=\"{}\"}} {count}",
                verdict.metric_label()
            );
        }
        out
    }
}
