//! Downstream controller emulation and the registers it shares with the
//! main loop.
//!
//! [`SlaveEmulator::serve`] is meant to run in the latch edge handler. It
//! busy-waits on the port for the rest of the transaction, each wait bounded
//! by the watchdog, so it returns within a few hundred microseconds whatever
//! the console does.

use nes_proto::{NesButtons, Response, ShiftEvent, ShiftMachine, ShiftOutcome, DATA_IDLE};
use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::timing::{reached, PortLines, ShiftPort, TickClock, Ticks};

/// The byte served on the next downstream poll.
///
/// Written by the main loop, read by the latch handler. A single atomic byte,
/// so a transaction sees either the old or the new value.
pub struct ShiftRegister(AtomicU8);

impl ShiftRegister {
    /// Starts with nothing pressed.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(NesButtons::IDLE_WIRE))
    }

    /// Replace the wire byte.
    pub fn publish(&self, byte: u8) {
        self.0.store(byte, Ordering::Release);
    }

    #[must_use]
    pub fn current(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for ShiftRegister {
    fn default() -> Self {
        Self::new()
    }
}

/// Host poll, raised by the latch handler for the main loop.
pub struct HostPollSignal {
    pending: AtomicBool,
    at: AtomicU32,
}

impl HostPollSignal {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            at: AtomicU32::new(0),
        }
    }

    /// Record a host poll that ended at `now`. A pending poll not yet
    /// taken is overwritten.
    pub fn record(&self, now: Ticks) {
        self.at.store(now, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    /// Take the pending poll timestamp, if any.
    pub fn take(&self) -> Option<Ticks> {
        if self.pending.swap(false, Ordering::AcqRel) {
            Some(self.at.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

impl Default for HostPollSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Emulator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EmulatorConfig {
    /// Longest wait for the next latch or clock edge.
    pub watchdog_ticks: Ticks,
}

impl EmulatorConfig {
    /// 170 µs with a 1 µs tick, well over one clock period.
    pub const DEFAULT: Self = Self { watchdog_ticks: 170 };
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Serves shift transactions on a downstream port.
pub struct SlaveEmulator<P, C> {
    port: P,
    clock: C,
    config: EmulatorConfig,
    machine: ShiftMachine,
}

impl<P: ShiftPort, C: TickClock> SlaveEmulator<P, C> {
    pub fn new(port: P, clock: C, config: EmulatorConfig) -> Self {
        Self {
            port,
            clock,
            config,
            machine: ShiftMachine::new(),
        }
    }

    /// Put the data line at its idle level.
    pub fn initialize(&mut self) {
        self.port.set_data(DATA_IDLE);
    }

    /// Handle a latch rising edge: serve the register's byte, then signal the
    /// main loop that the host polled, however the transaction ended.
    ///
    /// A relatch during the transaction starts a new one at once. Its edge
    /// has already been consumed here, so waiting for the next latch would
    /// skip it.
    pub fn on_latch(&mut self, register: &ShiftRegister, signal: &HostPollSignal) -> ShiftOutcome {
        let mut outcome = self.serve(register.current());
        while outcome == ShiftOutcome::LatchAbort {
            trace!("relatched, serving again");
            outcome = self.serve(register.current());
        }
        if outcome == ShiftOutcome::ClockTimeout {
            trace!("shift timed out");
        }
        signal.record(self.clock.now());
        outcome
    }

    /// Serve `byte` after a latch rising edge. Returns when the transaction
    /// ends, one way or the other.
    pub fn serve(&mut self, byte: u8) -> ShiftOutcome {
        let watchdog = self.config.watchdog_ticks;
        let mut response = self.machine.on_event(ShiftEvent::LatchRise { byte });
        let mut deadline = self.clock.now().wrapping_add(watchdog);
        // Latch is high by definition, even if the pulse already ended.
        let mut last = PortLines {
            latch: true,
            ..self.port.sample()
        };

        loop {
            match response {
                Response::Present(level) => {
                    self.port.set_data(level);
                    deadline = self.clock.now().wrapping_add(watchdog);
                }
                Response::Rearm => deadline = self.clock.now().wrapping_add(watchdog),
                Response::Finish(outcome) => {
                    if outcome == ShiftOutcome::Complete {
                        self.port.set_data(DATA_IDLE);
                    }
                    return outcome;
                }
                Response::Ignore => {}
            }

            let event = self.next_event(&mut last, byte, deadline);
            response = self.machine.on_event(event);
        }
    }

    /// Poll the port until an edge shows up or the deadline passes.
    fn next_event(&mut self, last: &mut PortLines, byte: u8, deadline: Ticks) -> ShiftEvent {
        loop {
            let lines = self.port.sample();
            let previous = core::mem::replace(last, lines);

            if lines.latch && !previous.latch {
                return ShiftEvent::LatchRise { byte };
            }
            if !lines.latch && previous.latch {
                // The first clock fall can come before the latch fall is
                // seen. A clock already low is then served on the next sample.
                last.clock = true;
                return ShiftEvent::LatchFall;
            }
            if !lines.clock && previous.clock {
                return ShiftEvent::ClockFall;
            }
            if reached(self.clock.now(), deadline) {
                return ShiftEvent::WatchdogExpired;
            }
        }
    }

    /// Get a mutable reference to the port, to wait for the next latch.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}
