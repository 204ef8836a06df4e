//! Upstream bus transceiver.
//!
//! Bit-bangs a command onto the single-wire line, then times the reply
//! level by level into a [`PulseSamples`] buffer and hands it to the
//! decoder. The whole exchange runs inside a critical section: an
//! interrupt in the middle of a measurement would stretch one level and
//! corrupt the frame, so masking is the only way to keep the timing.

use core::iter;

use gcn_proto::{
    decode_identity, decode_status, frame_bits, Command, ControllerReport, DecodeError, DeviceId,
    PulseSamples,
};

use crate::timing::{measure_level, Level, SingleWireLine, TickClock, Ticks};

/// Transceiver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransceiverConfig {
    /// Ticks of the bus clock in one NRZ unit (about 1 µs).
    pub unit_ticks: Ticks,
    /// Send the identify command before every status poll. Wireless
    /// receivers ignore status polls until identified.
    pub identify_first: bool,
}

impl TransceiverConfig {
    pub const DEFAULT: Self = Self {
        unit_ticks: 1,
        identify_first: true,
    };
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Error type for upstream polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollError {
    /// The line never rose after the command, or no reply started.
    ReceiveTimeout,
    /// A reply was received but with the wrong number of levels.
    FrameLengthMismatch,
}

impl From<DecodeError> for PollError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::FrameLengthMismatch => PollError::FrameLengthMismatch,
        }
    }
}

/// Drives the upstream line.
pub struct BusTransceiver<L, C> {
    line: L,
    clock: C,
    config: TransceiverConfig,
    samples: PulseSamples,
}

impl<L: SingleWireLine, C: TickClock> BusTransceiver<L, C> {
    /// Create a transceiver. The line is not touched until [`initialize`](Self::initialize).
    pub fn new(line: L, clock: C, config: TransceiverConfig) -> Self {
        Self {
            line,
            clock,
            config,
            samples: PulseSamples::new(),
        }
    }

    /// Put the line in its idle, released state.
    pub fn initialize(&mut self) {
        self.line.release();
    }

    /// Read the controller once.
    ///
    /// On error nothing has been produced; the caller keeps whatever report
    /// it had. There is no retry here.
    pub fn poll(&mut self) -> Result<ControllerReport, PollError> {
        if self.config.identify_first {
            // Only there to wake wireless receivers, the reply does not matter.
            let _ = self.identify();
        }

        self.transact(Command::STATUS)?;
        decode_status(&self.samples).map_err(|err| {
            debug!("status reply with {} samples", self.samples.len());
            PollError::from(err)
        })
    }

    /// Poll once and only report whether a controller answered.
    pub fn probe(&mut self) -> bool {
        self.poll().is_ok()
    }

    /// Ask the peripheral for its device identifier.
    pub fn identify(&mut self) -> Result<DeviceId, PollError> {
        self.transact(Command::Identify)?;
        Ok(decode_identity(&self.samples)?)
    }

    /// Level durations recorded during the last transaction.
    #[must_use]
    pub fn last_samples(&self) -> &[u8] {
        &self.samples
    }

    fn transact(&mut self, command: Command) -> Result<(), PollError> {
        let frame = command.bytes();
        critical_section::with(|_| {
            self.send(&frame);
            self.receive()
        })
    }

    /// Send the frame followed by the stop bit, then release the line.
    fn send(&mut self, frame: &[u8]) {
        let unit = self.config.unit_ticks;
        let mut deadline = self.clock.now();

        for bit in frame_bits(frame) {
            let low = if bit { unit } else { unit * 3 };
            self.line.drive_low();
            deadline = deadline.wrapping_add(low);
            self.clock.wait_until(deadline);
            self.line.release();
            deadline = deadline.wrapping_add(unit * 4 - low);
            self.clock.wait_until(deadline);
        }

        // Stop bit. The reply starts within a few units, so the high part
        // is not waited for.
        self.line.drive_low();
        self.clock.wait_until(deadline.wrapping_add(unit));
        self.line.release();
    }

    /// Time the reply levels until a level outlasts the 8-bit counter.
    fn receive(&mut self) -> Result<(), PollError> {
        self.samples.clear();

        // A slowly rising line must not be taken for the first falling edge.
        measure_level(&mut self.line, Level::Low).ok_or(PollError::ReceiveTimeout)?;
        // Idle time before the reply starts, not part of the frame.
        measure_level(&mut self.line, Level::High).ok_or(PollError::ReceiveTimeout)?;

        let levels = iter::repeat([Level::Low, Level::High]).flatten();
        for level in levels {
            let Some(count) = measure_level(&mut self.line, level) else {
                break;
            };
            if self.samples.push(count).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    extern crate std;

    use super::*;
    use gcn_proto::{Buttons, Dpad, IDENTIFY_SAMPLES, STATUS_SAMPLES};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Simulated bus shared by the line and clock handles.
    #[derive(Default)]
    pub(crate) struct Sim {
        pub(crate) now: Ticks,
        pub(crate) edges: Vec<(Ticks, Level)>,
        pub(crate) reply: VecDeque<(bool, u16)>,
    }

    #[derive(Clone)]
    pub(crate) struct SimLine(pub(crate) Rc<RefCell<Sim>>);

    #[derive(Clone)]
    pub(crate) struct SimClock(pub(crate) Rc<RefCell<Sim>>);

    impl SingleWireLine for SimLine {
        fn drive_low(&mut self) {
            let mut sim = self.0.borrow_mut();
            let now = sim.now;
            sim.edges.push((now, Level::Low));
        }

        fn release(&mut self) {
            let mut sim = self.0.borrow_mut();
            let now = sim.now;
            sim.edges.push((now, Level::High));
        }

        fn is_high(&mut self) -> bool {
            let mut sim = self.0.borrow_mut();
            let Some(front) = sim.reply.front_mut() else {
                return true;
            };
            let level = front.0;
            front.1 -= 1;
            if front.1 == 0 {
                sim.reply.pop_front();
            }
            level
        }
    }

    impl TickClock for SimClock {
        fn now(&mut self) -> Ticks {
            self.0.borrow().now
        }

        fn wait_until(&mut self, deadline: Ticks) {
            let mut sim = self.0.borrow_mut();
            sim.now = sim.now.max(deadline);
        }
    }

    /// Line levels of a reply carrying `bytes`, preceded by a short idle.
    pub(crate) fn reply_for(bytes: &[u8]) -> Vec<(bool, u16)> {
        let mut segments = std::vec![(true, 4)];
        for &byte in bytes {
            for shift in (0..8).rev() {
                if (byte >> shift) & 1 == 1 {
                    segments.extend_from_slice(&[(false, 10), (true, 30)]);
                } else {
                    segments.extend_from_slice(&[(false, 30), (true, 10)]);
                }
            }
        }
        segments.push((false, 10));
        segments
    }

    pub(crate) fn sim_with(reply: &[(bool, u16)]) -> Rc<RefCell<Sim>> {
        let sim = Rc::new(RefCell::new(Sim::default()));
        sim.borrow_mut().reply.extend(reply.iter().copied());
        sim
    }

    fn transceiver(
        sim: &Rc<RefCell<Sim>>,
        identify_first: bool,
    ) -> BusTransceiver<SimLine, SimClock> {
        let config = TransceiverConfig {
            unit_ticks: 10,
            identify_first,
        };
        BusTransceiver::new(SimLine(sim.clone()), SimClock(sim.clone()), config)
    }

    // Start + A, Up, sticks centered, triggers released.
    const STATUS: [u8; 8] = [0x11, 0x88, 0x80, 0x7F, 0x80, 0x7F, 0xFF, 0xFF];

    #[test]
    fn test_poll_decodes_status_reply() {
        let sim = sim_with(&reply_for(&STATUS));
        let mut bus = transceiver(&sim, false);
        bus.initialize();

        let report = bus.poll().unwrap();
        assert_eq!(bus.last_samples().len(), STATUS_SAMPLES);
        assert_eq!(report.buttons, Buttons::START | Buttons::A);
        assert_eq!(report.dpad, Dpad::UP);
        assert_eq!(report.stick.x, 0x80);
        assert_eq!(report.stick.y, 0x80);
        assert_eq!(report.left_trigger, 0);
    }

    #[test]
    fn test_poll_identifies_first() {
        let mut reply = reply_for(&[0x09, 0x00, 0x03]);
        reply.push((true, 300));
        reply.extend(reply_for(&STATUS));
        let sim = sim_with(&reply);
        let mut bus = transceiver(&sim, true);

        assert!(bus.poll().is_ok());
        assert!(sim.borrow().reply.is_empty());
    }

    #[test]
    fn test_identify() {
        let sim = sim_with(&reply_for(&[0x09, 0x00, 0x03]));
        let mut bus = transceiver(&sim, false);
        assert_eq!(bus.identify(), Ok(DeviceId([0x09, 0x00, 0x03])));
        assert_eq!(bus.last_samples().len(), IDENTIFY_SAMPLES);
    }

    #[test]
    fn test_absent_controller_times_out() {
        let sim = sim_with(&[]);
        let mut bus = transceiver(&sim, false);
        assert_eq!(bus.poll(), Err(PollError::ReceiveTimeout));
        assert!(!bus.probe());
    }

    #[test]
    fn test_stuck_low_line_times_out() {
        let sim = sim_with(&[(false, 1000)]);
        let mut bus = transceiver(&sim, false);
        assert_eq!(bus.poll(), Err(PollError::ReceiveTimeout));
    }

    #[test]
    fn test_truncated_reply_rejected() {
        let mut reply = reply_for(&STATUS);
        // Drop the last data bit, keep the stop bit.
        let stop = reply.pop().unwrap();
        reply.truncate(reply.len() - 2);
        reply.push(stop);

        let sim = sim_with(&reply);
        let mut bus = transceiver(&sim, false);
        assert_eq!(bus.poll(), Err(PollError::FrameLengthMismatch));
        assert_eq!(bus.last_samples().len(), STATUS_SAMPLES - 2);
    }

    #[test]
    fn test_probe_reports_success() {
        let sim = sim_with(&reply_for(&STATUS));
        let mut bus = transceiver(&sim, false);
        assert!(bus.probe());
    }

    #[test]
    fn test_command_bit_timing() {
        let sim = sim_with(&[]);
        let mut bus = transceiver(&sim, false);
        let _ = bus.poll();

        let edges = sim.borrow().edges.clone();
        // Low/release pairs: 24 command bits plus the stop bit.
        assert_eq!(edges.len(), 50);

        let mut bits = Vec::new();
        for (index, pair) in edges.chunks_exact(2).enumerate() {
            assert_eq!(pair[0].1, Level::Low);
            assert_eq!(pair[1].1, Level::High);
            let low = pair[1].0 - pair[0].0;
            assert!(low == 10 || low == 30, "low time {low}");
            bits.push(low == 10);

            // Every data bit spans exactly four units.
            if let Some(next) = edges.get(index * 2 + 2) {
                assert_eq!(next.0 - pair[0].0, 40);
            }
        }

        let mut expected: Vec<bool> = frame_bits(&[0x40, 0x03, 0x00]).collect();
        expected.push(true);
        assert_eq!(bits, expected);
    }
}
