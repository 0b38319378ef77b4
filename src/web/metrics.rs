use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

static EVENTS_SUBMITTED: AtomicU64 = AtomicU64::new(0);
static EVENTS_PROCESSED: AtomicU64 = AtomicU64::new(0);
static EVENTS_FAILED: AtomicU64 = AtomicU64::new(0);
static EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0);
static BOARDS_CREATED: AtomicU64 = AtomicU64::new(0);
static BOARDS_EDITED: AtomicU64 = AtomicU64::new(0);
static BOARDS_REMOVED: AtomicU64 = AtomicU64::new(0);
static STALE_REPOSTS_PURGED: AtomicU64 = AtomicU64::new(0);
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static ACTIVE_WORKERS: AtomicU64 = AtomicU64::new(0);

/// Process-wide starboard counters, rendered by [`format_prometheus`].
pub struct Metrics;

impl Metrics {
    pub fn mark_started() {
        Lazy::force(&STARTED_AT);
    }

    pub fn event_submitted() {
        EVENTS_SUBMITTED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_processed() {
        EVENTS_PROCESSED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_failed() {
        EVENTS_FAILED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dropped() {
        EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn board_created() {
        BOARDS_CREATED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn board_edited() {
        BOARDS_EDITED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn board_removed() {
        BOARDS_REMOVED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_repost_purged() {
        STALE_REPOSTS_PURGED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit() {
        CACHE_HITS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss() {
        CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_started() {
        ACTIVE_WORKERS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_stopped() {
        let _ = ACTIVE_WORKERS.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            Some(current.saturating_sub(1))
        });
    }
}

pub fn uptime_seconds() -> u64 {
    STARTED_AT.elapsed().as_secs()
}

pub fn format_prometheus() -> String {
    let cache_hits = CACHE_HITS.load(Ordering::Relaxed);
    let cache_misses = CACHE_MISSES.load(Ordering::Relaxed);
    let total_cache = cache_hits + cache_misses;
    let cache_hit_rate = if total_cache > 0 {
        (cache_hits as f64 / total_cache as f64) * 100.0
    } else {
        0.0
    };

    let series: [(&str, &str, &str, u64); 12] = [
        (
            "starboard_uptime_seconds",
            "gauge",
            "Number of seconds the bot has been running",
            uptime_seconds(),
        ),
        (
            "starboard_events_submitted_total",
            "counter",
            "Starboard events accepted by the queue",
            EVENTS_SUBMITTED.load(Ordering::Relaxed),
        ),
        (
            "starboard_events_processed_total",
            "counter",
            "Starboard events handled without error",
            EVENTS_PROCESSED.load(Ordering::Relaxed),
        ),
        (
            "starboard_events_failed_total",
            "counter",
            "Starboard events whose handling failed",
            EVENTS_FAILED.load(Ordering::Relaxed),
        ),
        (
            "starboard_events_dropped_total",
            "counter",
            "Starboard events refused after shutdown began",
            EVENTS_DROPPED.load(Ordering::Relaxed),
        ),
        (
            "starboard_boards_created_total",
            "counter",
            "Board posts created",
            BOARDS_CREATED.load(Ordering::Relaxed),
        ),
        (
            "starboard_boards_edited_total",
            "counter",
            "Board posts edited",
            BOARDS_EDITED.load(Ordering::Relaxed),
        ),
        (
            "starboard_boards_removed_total",
            "counter",
            "Board posts removed",
            BOARDS_REMOVED.load(Ordering::Relaxed),
        ),
        (
            "starboard_stale_reposts_purged_total",
            "counter",
            "Repost records dropped because a message no longer exists",
            STALE_REPOSTS_PURGED.load(Ordering::Relaxed),
        ),
        (
            "starboard_repost_cache_hits_total",
            "counter",
            "Repost cache hits",
            cache_hits,
        ),
        (
            "starboard_repost_cache_misses_total",
            "counter",
            "Repost cache misses",
            cache_misses,
        ),
        (
            "starboard_active_workers",
            "gauge",
            "Per-message queue workers currently running",
            ACTIVE_WORKERS.load(Ordering::Relaxed),
        ),
    ];

    let mut output = String::new();
    for (name, kind, help, value) in series {
        output.push_str(&format!(
            "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {value}\n\n"
        ));
    }
    output.push_str(&format!(
        "# HELP starboard_repost_cache_hit_rate Repost cache hit rate percentage\n\
         # TYPE starboard_repost_cache_hit_rate gauge\n\
         starboard_repost_cache_hit_rate {cache_hit_rate:.2}\n"
    ));
    output
}
