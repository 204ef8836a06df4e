//! Platform timing and pin primitives.
//!
//! Everything the core needs from the chip, kept to the minimum: a free
//! running tick counter, the upstream open-drain line and the three lines
//! of the downstream port. All durations in this crate are in ticks of
//! whichever [`TickClock`] the platform hands over, so the algorithms do
//! not change with the clock rate, only the configuration constants do.

/// Free-running tick count. Wraps around.
pub type Ticks = u32;

/// True once `now` has reached or passed `deadline`, across wrap-around.
#[inline]
#[must_use]
pub const fn reached(now: Ticks, deadline: Ticks) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// A free-running counter.
pub trait TickClock {
    /// Read the current tick.
    fn now(&mut self) -> Ticks;

    /// Busy-wait until `now() >= deadline`.
    fn wait_until(&mut self, deadline: Ticks) {
        while !reached(self.now(), deadline) {}
    }
}

/// Level of a bus line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

/// The single upstream data line.
///
/// The line is open-drain with a pull-up: the device either pulls it low
/// or lets go of it.
pub trait SingleWireLine {
    /// Actively pull the line low.
    fn drive_low(&mut self);

    /// Stop driving; the pull-up brings the line high unless the peripheral
    /// holds it low.
    fn release(&mut self);

    /// Sample the line.
    fn is_high(&mut self) -> bool;

    /// Sample the line as a [`Level`].
    #[inline]
    fn level(&mut self) -> Level {
        if self.is_high() {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Count how many samples the line stays at `level`.
///
/// The count includes the sample that saw the change. The counter is 8 bits
/// wide: if it wraps before the line changes, this is a timeout and `None` is
/// returned. The unit is one loop iteration, so the timeout is calibrated by
/// the speed of [`SingleWireLine::is_high`] on the target.
#[inline]
pub fn measure_level<L: SingleWireLine>(line: &mut L, level: Level) -> Option<u8> {
    let mut count: u8 = 0;
    loop {
        count = count.wrapping_add(1);
        if count == 0 {
            return None;
        }
        if line.level() != level {
            return Some(count);
        }
    }
}

/// Lines of the downstream controller port, sampled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortLines {
    pub latch: bool,
    pub clock: bool,
}

/// The downstream controller port: two inputs driven by the console, one
/// output driven by us.
pub trait ShiftPort {
    /// Sample latch and clock.
    fn sample(&mut self) -> PortLines;

    /// Drive the data line.
    fn set_data(&mut self, high: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Script {
        levels: [bool; 6],
        index: usize,
    }

    impl SingleWireLine for Script {
        fn drive_low(&mut self) {}
        fn release(&mut self) {}
        fn is_high(&mut self) -> bool {
            let level = self.levels.get(self.index).copied().unwrap_or(true);
            self.index += 1;
            level
        }
    }

    #[test]
    fn test_reached_across_wrap() {
        assert!(reached(10, 10));
        assert!(reached(11, 10));
        assert!(!reached(9, 10));
        assert!(reached(5, u32::MAX - 5));
        assert!(!reached(u32::MAX - 5, 5));
    }

    #[test]
    fn test_measure_counts_until_change() {
        let mut line = Script {
            levels: [false, false, false, true, true, false],
            index: 0,
        };
        assert_eq!(measure_level(&mut line, Level::Low), Some(4));
        assert_eq!(measure_level(&mut line, Level::High), Some(2));
    }

    #[test]
    fn test_measure_times_out_on_wrap() {
        let mut line = Script {
            levels: [true; 6],
            index: 0,
        };
        assert_eq!(measure_level(&mut line, Level::High), None);
        assert_eq!(line.index, 255);
    }
}
