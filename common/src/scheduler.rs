use crate::config::SamplingConfig;

pub const MAX_PERIOD_MS: u32 = i32::MAX as u32;

pub fn ticks_diff(later: u32, earlier: u32) -> i32 {
    later.wrapping_sub(earlier) as i32
}

#[derive(Debug, Clone, Copy)]
struct PeriodicTimer {
    period_ms: u32,
    last_fired: Option<u32>,
}

impl PeriodicTimer {
    fn new(period_ms: u32) -> Self {
        Self {
            period_ms: period_ms.clamp(1, MAX_PERIOD_MS),
            last_fired: None,
        }
    }

    fn is_due(&self, now: u32) -> bool {
        match self.last_fired {
            Some(last) => ticks_diff(now, last) >= self.period_ms as i32,
            None => true,
        }
    }

    fn poll(&mut self, now: u32) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.last_fired = Some(now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Due {
    pub environment: bool,
    pub current: bool,
}

/// Two independent sampling timers on one monotonic tick source.
///
/// Both fire on the first poll. A late poll fires immediately and the
/// cadence restarts from that tick.
#[derive(Debug, Clone)]
pub struct Scheduler {
    environment: PeriodicTimer,
    current: PeriodicTimer,
}

impl Scheduler {
    pub fn new(environment_period_ms: u32, current_period_ms: u32) -> Self {
        Self {
            environment: PeriodicTimer::new(environment_period_ms),
            current: PeriodicTimer::new(current_period_ms),
        }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(config.environment_period_ms, config.current_period_ms)
    }

    pub fn poll(&mut self, now: u32) -> Due {
        Due {
            environment: self.environment.poll(now),
            current: self.current.poll(now),
        }
    }

    pub fn current_period_ms(&self) -> u32 {
        self.current.period_ms
    }
}
