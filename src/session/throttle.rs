//! Adaptive throttle shared by every call of one session
//!
//! Two delays are tracked. The limit delay grows geometrically while the
//! remote service keeps signalling rate limits. The success delay decays
//! geometrically towards its floor while calls keep succeeding. The first
//! clean response after a limit restores both to their most cautious values.

use crate::config::ThrottleConfig;
use crate::{SessionError, SessionResult};
use std::time::Duration;

/// Current pacing values, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleState {
    pub limit_delay: f64,
    pub success_delay: f64,
}

/// Throttle bounds plus the mutable state they govern
#[derive(Debug, Clone)]
pub struct Throttle {
    limit_floor: f64,
    limit_growth: f64,
    success_floor: f64,
    success_ceiling: f64,
    success_decay: f64,
    state: ThrottleState,
}

impl Throttle {
    /// Creates a throttle in its initial (maximum caution) state
    pub fn new(config: &ThrottleConfig) -> Self {
        Self {
            limit_floor: config.limit_sleep_time_min,
            limit_growth: config.limit_sleep_time_coefficient,
            success_floor: config.success_sleep_time_min,
            success_ceiling: config.success_sleep_time_max,
            success_decay: config.success_sleep_time_coefficient,
            state: ThrottleState {
                limit_delay: config.limit_sleep_time_min,
                success_delay: config.success_sleep_time_max,
            },
        }
    }

    pub fn state(&self) -> ThrottleState {
        self.state
    }

    /// Restores the initial state
    pub fn reset(&mut self) {
        self.state = ThrottleState {
            limit_delay: self.limit_floor,
            success_delay: self.success_ceiling,
        };
    }

    /// Returns the delay owed after a limit signal and escalates the next one
    ///
    /// The limit delay has no upper bound.
    pub fn on_limit(&mut self) -> Duration {
        let delay = self.state.limit_delay;
        self.state.limit_delay *= self.limit_growth;
        seconds(delay)
    }

    /// Returns the delay owed after any non-limit outcome and decays the next one
    pub fn on_response(&mut self) -> Duration {
        if self.state.limit_delay > self.limit_floor {
            self.reset();
        }
        let delay = self.state.success_delay;
        let excess = (self.state.success_delay - self.success_floor).max(0.0);
        self.state.success_delay = self.success_floor + excess * self.success_decay;
        seconds(delay)
    }

    /// Dispatches on the outcome of a call
    pub fn after_call<T>(&mut self, outcome: &SessionResult<T>) -> Duration {
        match outcome {
            Err(SessionError::Limit) => self.on_limit(),
            _ => self.on_response(),
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
