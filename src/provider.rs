//! Per-provider health and statistics
//!
//! The pool keeps one [`ProviderHealth`] per provider behind a mutex and
//! one set of atomic counters. Health drives failover: after
//! `failure_threshold` consecutive connect/auth failures the provider
//! "trips" into a cooldown window, and when the window expires exactly one
//! caller is admitted to try it again.

use crate::config::CooldownConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration, Instant};

/// Whether a provider may be tried right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Healthy; try freely
    Ready,
    /// Cooldown expired; the caller holds the single trial slot
    Trial,
    /// Skip until the given instant
    CoolingUntil(Instant),
    /// Cooldown expired but another caller holds the trial slot
    TrialInFlight,
}

/// Failure bookkeeping for one provider
#[derive(Debug, Clone, Default)]
pub struct ProviderHealth {
    /// Connect/auth failures since the last success or trip
    pub consecutive_failures: u32,
    /// Cooldowns entered since the last success
    pub trips: u32,
    /// End of the current cooldown window
    pub cooldown_until: Option<Instant>,
    /// A trial attempt is in flight
    pub on_trial: bool,
}

impl ProviderHealth {
    /// Decide whether the provider can be tried at `now`, claiming the
    /// trial slot when the cooldown has just expired
    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.cooldown_until {
            None => Admission::Ready,
            Some(until) if now < until => Admission::CoolingUntil(until),
            Some(_) if self.on_trial => Admission::TrialInFlight,
            Some(_) => {
                self.on_trial = true;
                Admission::Trial
            }
        }
    }

    /// Give back a trial slot that was claimed but never used
    pub fn cancel_trial(&mut self) {
        self.on_trial = false;
    }

    /// A session was handed out; the provider is healthy again
    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    /// Count a provider fault, returning the cooldown window if this
    /// failure tripped the provider
    ///
    /// A failed trial re-trips immediately with the next, longer window.
    pub fn record_failure(&mut self, cooldown: &CooldownConfig, now: Instant) -> Option<Duration> {
        self.consecutive_failures += 1;
        let trial_failed = std::mem::take(&mut self.on_trial);
        if trial_failed || self.consecutive_failures >= cooldown.failure_threshold.max(1) {
            self.trips += 1;
            self.consecutive_failures = 0;
            let window = cooldown.window(self.trips);
            self.cooldown_until = Some(now + window);
            return Some(window);
        }
        None
    }

    /// True while a cooldown window is open at `now`
    pub fn is_cooling(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

/// Point-in-time statistics for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStats {
    /// Provider label
    pub name: String,
    /// Failover priority (lower first)
    pub priority: u32,
    /// Configured concurrent connection cap
    pub max_connections: u32,
    /// Sessions currently lent out
    pub in_use: u32,
    /// Sessions handed out
    pub acquired: u64,
    /// Sessions given back, healthy or not
    pub released: u64,
    /// Connect/auth failures and unhealthy releases
    pub failed: u64,
    /// Sessions discarded instead of reused
    pub discarded: u64,
    /// Current consecutive failure count
    pub consecutive_failures: u32,
    /// Cooldowns entered since the last success
    pub trips: u32,
    /// Whether the provider is inside a cooldown window
    pub cooling_down: bool,
}

/// Lock-free counters shared by acquire and release paths
#[derive(Debug, Default)]
pub(crate) struct ProviderCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl ProviderCounters {
    pub(crate) fn record_acquired(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_released(&self, healthy: bool) {
        self.released.fetch_add(1, Ordering::Relaxed);
        if !healthy {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// (acquired, released, failed, discarded)
    pub(crate) fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.acquired.load(Ordering::Relaxed),
            self.released.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.discarded.load(Ordering::Relaxed),
        )
    }
}
