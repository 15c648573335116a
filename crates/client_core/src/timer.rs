/// Countdown state machine: `Idle → Running → {Paused ⇄ Running} →
/// Expired | Stopped`. The driver task in `GameSession` delivers one
/// `tick()` per second; everything here is synchronous so the transitions
/// can be tested without a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Expired,
    Stopped,
}

/// Outcome of delivering one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Time advanced (or the tick was swallowed while paused/idle).
    Counting,
    /// The countdown just hit zero. Reported exactly once.
    Expired,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    phase: TimerPhase,
    time_limit: u32,
    time_left: u32,
}

impl Countdown {
    pub fn new(time_limit: u32) -> Self {
        Self {
            phase: TimerPhase::Idle,
            time_limit,
            time_left: time_limit,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn time_limit(&self) -> u32 {
        self.time_limit
    }

    /// Seconds consumed at the moment of stop/expiry.
    pub fn elapsed(&self) -> u32 {
        self.time_limit - self.time_left
    }

    pub fn start(&mut self) {
        if self.phase == TimerPhase::Idle {
            self.time_left = self.time_limit;
            // A zero-limit game is expired before its first tick.
            self.phase = if self.time_limit == 0 {
                TimerPhase::Expired
            } else {
                TimerPhase::Running
            };
        }
    }

    pub fn pause(&mut self) {
        if self.phase == TimerPhase::Running {
            self.phase = TimerPhase::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.phase == TimerPhase::Paused {
            self.phase = TimerPhase::Running;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.phase == TimerPhase::Paused
    }

    /// Explicit stop on manual submission; cancels further ticking.
    pub fn stop(&mut self) {
        if matches!(self.phase, TimerPhase::Running | TimerPhase::Paused) {
            self.phase = TimerPhase::Stopped;
        }
    }

    /// Delivers one one-second tick. Only a Running countdown advances;
    /// ticks while Paused freeze elapsed time, and ticks after
    /// Expired/Stopped are no-ops.
    pub fn tick(&mut self) -> Tick {
        if self.phase != TimerPhase::Running {
            return Tick::Counting;
        }
        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            self.phase = TimerPhase::Expired;
            return Tick::Expired;
        }
        Tick::Counting
    }
}

#[cfg(test)]
#[path = "tests/timer_tests.rs"]
mod tests;
