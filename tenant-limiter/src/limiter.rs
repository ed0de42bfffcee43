//! Each tenant gets `limit` requests per window. A window opens on the first
//! request a tenant makes and lasts `window`; the first request after it has
//! elapsed opens a new one with a fresh count. Requests over the limit are
//! still counted, so a tenant hammering the service stays limited until the
//! window rolls over.
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use metrics::gauge;
use rand::Rng;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::clock::{Clock, SystemClock};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("more than {limit} requests in {window}")]
pub struct LimitExceeded {
    pub limit: u32,
    pub window: Duration,
}

impl LimitExceeded {
    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.whole_milliseconds()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started_at: OffsetDateTime,
}

impl Window {
    fn open(now: OffsetDateTime) -> Self {
        Window {
            count: 0,
            started_at: now,
        }
    }

    fn is_expired(&self, now: OffsetDateTime, length: Duration) -> bool {
        now - self.started_at > length
    }
}

/// Owns the per-tenant counters. Clones share state, so one limiter is
/// created at startup and handed to every request.
#[derive(Clone)]
pub struct TenantLimiter {
    windows: Arc<DashMap<String, Window>>,
    limit: NonZeroU32,
    window: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl TenantLimiter {
    pub fn new(limit: NonZeroU32, window: std::time::Duration) -> Self {
        Self::with_clock(limit, window, SystemClock)
    }

    pub fn with_clock<C>(limit: NonZeroU32, window: std::time::Duration, clock: C) -> Self
    where
        C: Clock + Send + Sync + 'static,
    {
        TenantLimiter {
            windows: Arc::new(DashMap::new()),
            limit,
            // Windows too long to represent never expire.
            window: Duration::try_from(window).unwrap_or(Duration::MAX),
            clock: Arc::new(clock),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit.get()
    }

    /// Count one request for `tenant`. The read-and-update of a tenant's window
    /// happens under the map's entry lock, so concurrent requests for the same
    /// tenant are counted exactly.
    pub fn check(&self, tenant: &str) -> Result<(), LimitExceeded> {
        let now = self.clock.now();

        let mut window = self
            .windows
            .entry(tenant.to_owned())
            .or_insert_with(|| Window::open(now));

        if window.is_expired(now, self.window) {
            *window = Window::open(now);
        }
        window.count = window.count.saturating_add(1);

        if window.count > self.limit.get() {
            Err(LimitExceeded {
                limit: self.limit.get(),
                window: self.window,
            })
        } else {
            Ok(())
        }
    }

    /// Number of tenants currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop every tenant whose window has expired, returning how many were removed.
    pub fn retain_recent(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| !window.is_expired(now, self.window));
        self.windows.shrink_to_fit();
        before.saturating_sub(self.windows.len())
    }

    /// Evict expired tenants about once a minute, needs to be spawned in a
    /// separate task.
    pub async fn clean_state(&self) {
        // Jitter so that replicas don't all sweep at the same moment.
        let interval_secs = rand::thread_rng().gen_range(60..70);

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;

            let evicted = self.retain_recent();
            debug!(evicted, "evicted expired tenant windows");
        }
    }

    /// Reports the number of tracked tenants to prometheus every 10 seconds,
    /// needs to be spawned in a separate task.
    pub async fn report_metrics(&self) {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        loop {
            interval.tick().await;
            gauge!("tenant_limiter_key_count").set(self.windows.len() as f64);
        }
    }
}
