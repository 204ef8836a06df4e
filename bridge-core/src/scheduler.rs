//! Adaptive upstream poll scheduling.
//!
//! The console polls the pad at a fixed cadence the pad cannot see in
//! advance. Polling the controller right after serving the console means the
//! next reply carries data almost one full interval old. The scheduler
//! learns the interval from the timestamps of downstream transactions and
//! grants one upstream poll per interval, as late as it can while still
//! finishing before the next downstream poll:
//!
//! ```text
//! host poll                                              next host poll
//!     |<------------------------- interval ------------------->|
//!     |<--------- threshold --------->|<- poll ->|<- margin ->|
//! ```

use crate::timing::Ticks;

/// Scheduler constants, in ticks of the clock passed as `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerConfig {
    /// Duration of one upstream poll.
    pub time_to_poll: Ticks,
    /// Slack kept between the end of the upstream poll and the next host poll.
    pub margin: Ticks,
    /// Intervals shorter than this are not learned from, and no threshold
    /// goes below it.
    pub min_idle: Ticks,
    /// Threshold used until an interval has been learned, or after the host
    /// went quiet.
    pub default_threshold: Ticks,
    /// Elapsed times above this count as an overflow: the host stopped polling.
    pub counter_limit: Ticks,
}

impl SchedulerConfig {
    /// Values for a 1 µs tick.
    pub const DEFAULT: Self = Self {
        time_to_poll: 333,
        margin: 666,
        min_idle: 1700,
        default_threshold: 2333,
        counter_limit: 65535,
    };
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerState {
    WaitingForThreshold,
    ThresholdReached,
}

/// Decides when the upstream controller may be polled.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollScheduler {
    config: SchedulerConfig,
    threshold: Ticks,
    state: SchedulerState,
    last_poll: Ticks,
    overflowed: bool,
}

impl PollScheduler {
    /// Create a scheduler whose interval measurement starts at `now`.
    #[must_use]
    pub const fn new(config: SchedulerConfig, now: Ticks) -> Self {
        Self {
            config,
            threshold: config.default_threshold,
            state: SchedulerState::WaitingForThreshold,
            last_poll: now,
            overflowed: false,
        }
    }

    /// Forget everything learned and start measuring at `now`.
    pub fn restart(&mut self, now: Ticks) {
        *self = Self::new(self.config, now);
    }

    /// Record a downstream transaction that ended at `now`.
    pub fn on_host_polled(&mut self, now: Ticks) {
        let elapsed = self.elapsed(now);
        let previous = self.threshold;

        if self.overflowed {
            self.threshold = self.config.default_threshold;
        } else if elapsed > self.config.min_idle {
            let SchedulerConfig {
                time_to_poll,
                margin,
                min_idle,
                default_threshold,
                ..
            } = self.config;

            self.threshold = if elapsed > time_to_poll + min_idle + margin {
                elapsed - time_to_poll - margin
            } else {
                default_threshold
            };
            if self.threshold < min_idle {
                self.threshold = default_threshold;
            }
        }

        if self.threshold != previous {
            debug!("poll threshold {} -> {}", previous, self.threshold);
        }

        self.last_poll = now;
        self.overflowed = false;
        self.state = SchedulerState::WaitingForThreshold;
    }

    /// True once per host interval, when the threshold has been reached.
    pub fn may_poll_now(&mut self, now: Ticks) -> bool {
        let elapsed = self.elapsed(now);
        if self.state != SchedulerState::WaitingForThreshold {
            return false;
        }
        if self.overflowed || elapsed >= self.threshold {
            self.state = SchedulerState::ThresholdReached;
            return true;
        }
        false
    }

    #[must_use]
    pub const fn threshold(&self) -> Ticks {
        self.threshold
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Elapsed ticks since the last host poll. Latches the overflow flag.
    fn elapsed(&mut self, now: Ticks) -> Ticks {
        let elapsed = now.wrapping_sub(self.last_poll);
        if elapsed > self.config.counter_limit {
            self.overflowed = true;
        }
        elapsed
    }
}
