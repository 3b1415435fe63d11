//! Pipeline counters.
//!
//! Always counted; with live mode on (the `THUMBD_THUMBNAILS_DEBUG`
//! variable) every event is also logged as it happens under the
//! `thumbd::instr` target. A summary is logged once at teardown.

use std::path::Path;

use tracing::{debug, info};

/// Point-in-time copy of the counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub discarded_notifications: u64,
    pub decodes_dispatched: u64,
    pub decode_failures: u64,
    pub video_tasks_started: u64,
    pub video_tasks_completed: u64,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    counts: DiagnosticsSnapshot,
    live: bool,
}

impl Diagnostics {
    pub fn new(live: bool) -> Self {
        if live {
            debug!(target: "thumbd::instr", "Instrumentation enabled");
        }
        Self {
            counts: DiagnosticsSnapshot::default(),
            live,
        }
    }

    pub fn cache_hit(&mut self, path: &Path) {
        self.counts.cache_hits += 1;
        if self.live {
            debug!(target: "thumbd::instr", ?path, hits = self.counts.cache_hits, "cache hit");
        }
    }

    pub fn cache_miss(&mut self, path: &Path) {
        self.counts.cache_misses += 1;
        if self.live {
            debug!(target: "thumbd::instr", ?path, misses = self.counts.cache_misses, "cache miss");
        }
    }

    pub fn cache_evicted(&mut self, inserted: &Path) {
        self.counts.cache_evictions += 1;
        if self.live {
            debug!(
                target: "thumbd::instr",
                ?inserted,
                evictions = self.counts.cache_evictions,
                "cache eviction"
            );
        }
    }

    pub fn discarded(&mut self, path: &Path, count: usize) {
        if count == 0 {
            return;
        }
        self.counts.discarded_notifications += count as u64;
        if self.live {
            debug!(
                target: "thumbd::instr",
                ?path,
                ignored = self.counts.discarded_notifications,
                "ignored stale notification"
            );
        }
    }

    pub fn decode_dispatched(&mut self, path: &Path) {
        self.counts.decodes_dispatched += 1;
        if self.live {
            debug!(target: "thumbd::instr", ?path, dispatched = self.counts.decodes_dispatched, "decode dispatched");
        }
    }

    pub fn decode_failed(&mut self, path: &Path) {
        self.counts.decode_failures += 1;
        if self.live {
            debug!(target: "thumbd::instr", ?path, failures = self.counts.decode_failures, "decode failed");
        }
    }

    pub fn video_started(&mut self, path: &Path) {
        self.counts.video_tasks_started += 1;
        if self.live {
            debug!(target: "thumbd::instr", ?path, started = self.counts.video_tasks_started, "video task start");
        }
    }

    pub fn video_completed(&mut self, path: &Path) {
        self.counts.video_tasks_completed += 1;
        if self.live {
            debug!(
                target: "thumbd::instr",
                ?path,
                completed = self.counts.video_tasks_completed,
                "video task completed"
            );
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.counts
    }

    /// Log the teardown summary.
    pub fn log_summary(&self) {
        let c = &self.counts;
        info!(
            cache_hits = c.cache_hits,
            cache_misses = c.cache_misses,
            cache_evictions = c.cache_evictions,
            ignored_notifies = c.discarded_notifications,
            dispatched = c.decodes_dispatched,
            failed = c.decode_failures,
            video_started = c.video_tasks_started,
            video_completed = c.video_tasks_completed,
            "Thumbnail pipeline summary"
        );
    }
}
