use std::time::{Duration, Instant};

use chrono::{DateTime, Local, TimeZone};

/// Date and time as shown in the kiosk header.
pub fn format_clock<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%d/%m/%Y   %H:%M:%S").to_string()
}

/// Header clock plus the "waiting" dots animation of the home screen.
///
/// Both advance on their own intervals, independent of any network activity.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    clock_every: Duration,
    dots_every: Duration,
    next_clock: Instant,
    next_dots: Instant,
    clock_text: String,
    dots_step: usize,
}

impl Heartbeat {
    pub fn new(clock_every: Duration, dots_every: Duration, now: Instant) -> Self {
        Self {
            clock_every,
            dots_every,
            next_clock: now + clock_every,
            next_dots: now + dots_every,
            clock_text: format_clock(&Local::now()),
            dots_step: 0,
        }
    }

    /// Advance whatever is due. Returns true when the display changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if now >= self.next_clock {
            self.clock_text = format_clock(&Local::now());
            self.next_clock = now + self.clock_every;
            changed = true;
        }
        if now >= self.next_dots {
            self.dots_step = self.dots_step.wrapping_add(1);
            self.next_dots = now + self.dots_every;
            changed = true;
        }
        changed
    }

    pub fn clock_text(&self) -> &str {
        &self.clock_text
    }

    pub fn dots(&self) -> String {
        ".".repeat(self.dots_step % 4)
    }
}
