//! Per-channel rate limiting for outbound calls.
//!
//! Each channel (geocoding, page fetches) enforces a minimum interval between
//! successive acquisitions. Channels are independent. Callers waiting on the
//! same channel are served in arrival order.
//!
//! One `RateLimiter` should exist per process; clones share state, so
//! concurrent jobs hitting the same provider still honor its global rate.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A class of external calls sharing one rate contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Geocode,
    Fetch,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Geocode => f.write_str("geocode"),
            Channel::Fetch => f.write_str("fetch"),
        }
    }
}

struct ChannelGate {
    interval: Duration,
    limiter: Option<DirectLimiter>,
    /// Last grant time. The tokio mutex queues waiters FIFO.
    last: Mutex<Option<Instant>>,
}

impl ChannelGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            limiter: Quota::with_period(interval).map(DirectLimiter::direct),
            last: Mutex::new(None),
        }
    }
}

/// Process-wide, per-channel minimum-interval limiter.
#[derive(Clone, Default)]
pub struct RateLimiter {
    gates: Arc<RwLock<HashMap<Channel, Arc<ChannelGate>>>>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gates = self.gates.read().unwrap_or_else(PoisonError::into_inner);
        let mut map = f.debug_map();
        for (channel, gate) in gates.iter() {
            map.entry(channel, &gate.interval);
        }
        map.finish()
    }
}

impl RateLimiter {
    /// Create a limiter with no configured channels (no pacing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum interval for a channel.
    pub fn with_interval(self, channel: Channel, interval: Duration) -> Self {
        self.set_interval(channel, interval);
        self
    }

    /// Set the minimum interval for a channel, replacing any previous gate.
    pub fn set_interval(&self, channel: Channel, interval: Duration) {
        self.gates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel, Arc::new(ChannelGate::new(interval)));
    }

    /// Minimum interval configured for a channel (zero if unconfigured).
    pub fn min_interval(&self, channel: Channel) -> Duration {
        self.gates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .map(|g| g.interval)
            .unwrap_or_default()
    }

    fn gate(&self, channel: Channel) -> Arc<ChannelGate> {
        if let Some(gate) = self
            .gates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
        {
            return gate.clone();
        }

        self.gates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel)
            .or_insert_with(|| Arc::new(ChannelGate::new(Duration::ZERO)))
            .clone()
    }

    /// Wait until a call on `channel` is allowed.
    pub async fn acquire(&self, channel: Channel) {
        let gate = self.gate(channel);
        let mut last = gate.last.lock().await;

        if let Some(limiter) = &gate.limiter {
            limiter.until_ready().await;
        }

        // The floor is measured on tokio's clock, which callers observe.
        if let Some(previous) = *last {
            let due = previous + gate.interval;
            if Instant::now() < due {
                tokio::time::sleep_until(due).await;
            }
        }

        *last = Some(Instant::now());
        tracing::trace!(channel = %channel, "rate limiter permit granted");
    }
}
