//! Awake-window countdown policy

/// Outcome of a single countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Seconds still left in the window
    Remaining(u32),
    /// The window ran out on this tick
    Expired,
}

/// Seconds left in the awake window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
}

impl Countdown {
    /// Reset to a full budget, discarding any previous value
    pub fn start(&mut self, budget: u32) {
        self.remaining = budget;
    }

    /// Consume one second.
    ///
    /// Expires on the tick that would bring the count to zero, so a budget
    /// of N expires on the Nth tick. Ticking an already cleared countdown
    /// also reports expiry.
    pub fn tick(&mut self) -> Tick {
        if self.remaining <= 1 {
            self.remaining = 0;
            Tick::Expired
        } else {
            self.remaining -= 1;
            Tick::Remaining(self.remaining)
        }
    }

    pub fn clear(&mut self) {
        self.remaining = 0;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
