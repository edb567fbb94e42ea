//! Per-scope send-rate controller used by the adaptive strategy
//!
//! The limiter stays disabled (zero delay) until a scope sees its first
//! throttling failure. From then on it paces attempts at an allowed rate:
//! each attempt is scheduled one interval after the previous one and the
//! caller waits `max(0, scheduled - now)`.
//!
//! The allowed rate is multiplied down on throttling and increased by a
//! fixed step on success, but only once a cooldown has passed since the
//! last throttle.

use crate::scope_map::ScopeMap;
use retries_api::{Result, RetryError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Length of one send-rate measurement window.
const MEASUREMENT_WINDOW: Duration = Duration::from_millis(500);

/// Weight of the newest window in the smoothed send rate.
const MEASUREMENT_SMOOTHING: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Floor of the allowed rate, in attempts per second.
    pub min_rate: f64,
    /// Ceiling of the allowed rate, in attempts per second.
    pub max_rate: f64,
    /// Multiplier applied to the rate on each throttling failure.
    pub decrease_factor: f64,
    /// Attempts per second added on each success after the cooldown.
    pub increase_step: f64,
    /// Minimum time since the last throttle before the rate may grow.
    pub cooldown: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_rate: 0.5,
            max_rate: 100.0,
            decrease_factor: 0.5,
            increase_step: 1.0,
            cooldown: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_rate.is_finite() && self.min_rate > 0.0) {
            return Err(RetryError::InvalidArgument(format!(
                "min_rate must be a positive number, got {}",
                self.min_rate
            )));
        }
        if !(self.max_rate.is_finite() && self.max_rate >= self.min_rate) {
            return Err(RetryError::InvalidArgument(format!(
                "max_rate {} must be finite and >= min_rate {}",
                self.max_rate, self.min_rate
            )));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(RetryError::InvalidArgument(format!(
                "decrease_factor must be in (0, 1), got {}",
                self.decrease_factor
            )));
        }
        if !(self.increase_step.is_finite() && self.increase_step >= 0.0) {
            return Err(RetryError::InvalidArgument(format!(
                "increase_step must be a non-negative number, got {}",
                self.increase_step
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    enabled: bool,
    allowed_rate: f64,
    next_send: Option<Instant>,
    last_throttle: Option<Instant>,
    measured_rate: f64,
    window_start: Option<Instant>,
    window_sends: u32,
}

impl RateLimiter {
    pub(crate) fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState {
                enabled: false,
                allowed_rate: config.max_rate,
                next_send: None,
                last_throttle: None,
                measured_rate: 0.0,
                window_start: None,
                window_sends: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count an attempt that is sent without pacing (first attempts).
    pub(crate) fn record_send(&self, now: Instant) {
        self.lock().measure(now);
    }

    /// React to a throttling failure observed at `now`.
    pub(crate) fn on_throttle(&self, now: Instant) {
        let mut state = self.lock();
        let reference = if state.measured_rate > 0.0 {
            state.measured_rate.min(state.allowed_rate)
        } else {
            state.allowed_rate
        };
        state.allowed_rate = (reference * self.config.decrease_factor).max(self.config.min_rate);
        state.enabled = true;
        state.last_throttle = Some(now);
        tracing::debug!(
            allowed_rate = state.allowed_rate,
            measured_rate = state.measured_rate,
            "throttled, lowering send rate"
        );
    }

    /// React to a successful call observed at `now`.
    pub(crate) fn on_success(&self, now: Instant) {
        let mut state = self.lock();
        if !state.enabled {
            return;
        }
        let cooled_down = state
            .last_throttle
            .is_none_or(|at| now.saturating_duration_since(at) >= self.config.cooldown);
        if cooled_down {
            state.allowed_rate =
                (state.allowed_rate + self.config.increase_step).min(self.config.max_rate);
            tracing::trace!(allowed_rate = state.allowed_rate, "raising send rate");
        }
    }

    /// Reserve the next send slot and return how long to wait for it.
    pub(crate) fn reserve(&self, now: Instant) -> Duration {
        let mut state = self.lock();
        if !state.enabled {
            state.measure(now);
            return Duration::ZERO;
        }

        let interval = Duration::try_from_secs_f64(1.0 / state.allowed_rate)
            .unwrap_or(Duration::MAX);
        let scheduled = state.next_send.map_or(now, |next| next.max(now));
        state.next_send = Some(scheduled.checked_add(interval).unwrap_or(scheduled));
        state.measure(scheduled);

        let delay = scheduled.saturating_duration_since(now);
        tracing::trace!(
            allowed_rate = state.allowed_rate,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reserved send slot"
        );
        delay
    }

    pub(crate) fn allowed_rate(&self) -> f64 {
        self.lock().allowed_rate
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.lock().enabled
    }
}

impl LimiterState {
    fn measure(&mut self, at: Instant) {
        let start = *self.window_start.get_or_insert(at);
        self.window_sends = self.window_sends.saturating_add(1);

        let elapsed = at.saturating_duration_since(start);
        if elapsed >= MEASUREMENT_WINDOW {
            let current = f64::from(self.window_sends) / elapsed.as_secs_f64();
            self.measured_rate =
                MEASUREMENT_SMOOTHING * current + (1.0 - MEASUREMENT_SMOOTHING) * self.measured_rate;
            self.window_start = Some(at);
            self.window_sends = 0;
        }
    }
}

#[derive(Debug)]
pub(crate) struct RateLimiterStore {
    config: RateLimiterConfig,
    limiters: ScopeMap<RateLimiter>,
}

impl RateLimiterStore {
    pub(crate) fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            limiters: ScopeMap::new(),
        }
    }

    pub(crate) fn limiter(&self, scope: &str) -> Arc<RateLimiter> {
        let config = self.config;
        self.limiters
            .get_or_insert_with(scope, || RateLimiter::new(config))
    }

    /// Allowed rate for `scope`, or `None` while the scope has never been
    /// throttled.
    pub(crate) fn allowed_rate(&self, scope: &str) -> Option<f64> {
        let limiter = self.limiters.get(scope)?;
        limiter.is_enabled().then(|| limiter.allowed_rate())
    }

    pub(crate) fn evict(&self, scope: &str) -> bool {
        self.limiters.remove(scope)
    }
}
