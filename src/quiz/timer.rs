use std::time::Duration;

/// Pause between showing feedback and loading the next question.
pub const FEEDBACK_PAUSE: Duration = Duration::from_secs(2);

/// Interval between two countdown ticks.
pub const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Running(u32),
    Expired,
    Cancelled,
}

/// Per-question countdown, advanced one second per `tick`.
///
/// Whoever owns it decides how ticks are scheduled. The bot drives it from a
/// tokio interval; tests simply call `tick` in a loop.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Countdown {
    total: u32,
    remaining: u32,
    state: CountdownState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
enum CountdownState {
    Running,
    Expired,
    Cancelled,
}

impl Countdown {
    pub fn new(seconds: u32) -> Self {
        Self {
            total: seconds,
            remaining: seconds,
            state: CountdownState::Running,
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.state == CountdownState::Running
    }

    /// Advances one second. Keeps returning `Expired` once time is up.
    pub fn tick(&mut self) -> TimerEvent {
        match self.state {
            CountdownState::Cancelled => TimerEvent::Cancelled,
            CountdownState::Expired => TimerEvent::Expired,
            CountdownState::Running => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.state = CountdownState::Expired;
                    TimerEvent::Expired
                } else {
                    TimerEvent::Running(self.remaining)
                }
            }
        }
    }

    /// Stops the countdown. Has no effect once it has expired.
    pub fn cancel(&mut self) {
        if self.state == CountdownState::Running {
            self.state = CountdownState::Cancelled;
        }
    }
}
