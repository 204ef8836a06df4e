//! Platform-agnostic core of the GameCube-to-NES adapter.
//!
//! The adapter sits between a GameCube controller and a NES console. It
//! polls the controller on the single-wire GameCube bus and serves the
//! result as a NES button byte whenever the console latches the pad. The
//! two sides run at their own pace:
//!
//! - the console's latch edge preempts everything and is served from the
//!   [`ShiftRegister`] by the [`SlaveEmulator`]
//! - the main loop runs the [`Bridge`], which polls the controller when the
//!   [`PollScheduler`] allows it and republishes the register
//!
//! # Overview
//!
//! - [`timing`]: chip traits ([`TickClock`], [`SingleWireLine`], [`ShiftPort`])
//! - [`transceiver`]: GameCube bus master ([`BusTransceiver`])
//! - [`store`]: last report and change detection ([`ReportStore`])
//! - [`scheduler`]: adaptive poll timing ([`PollScheduler`])
//! - [`emulator`]: NES pad emulation and handoff registers ([`SlaveEmulator`])
//! - [`mapping`]: report to NES buttons ([`Mapper`])
//! - [`bridge`]: main-loop step ([`Bridge`])
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting and logging (for embedded targets)
//! - **`log`**: Log through the `log` facade instead
//! - **`inverted-c-stick`**: Keep the raw wire polarity of the C-stick Y axis
//!
//! # Platform requirements
//!
//! [`BusTransceiver`] runs its transaction in a `critical_section::with`
//! block, so the final binary needs a `critical-section` implementation.
//! The handoff registers use `portable-atomic`; on targets without native
//! atomic swap enable its `critical-section` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod fmt;

pub mod bridge;
pub mod emulator;
pub mod mapping;
pub mod scheduler;
pub mod store;
pub mod timing;
pub mod transceiver;

pub use bridge::{Bridge, Step};
pub use emulator::{EmulatorConfig, HostPollSignal, ShiftRegister, SlaveEmulator};
pub use mapping::{Mapper, MappingMode, AXIS_THRESHOLD, RUN_THRESHOLD};
pub use scheduler::{PollScheduler, SchedulerConfig, SchedulerState};
pub use store::ReportStore;
pub use timing::{measure_level, reached, Level, PortLines, ShiftPort, SingleWireLine, TickClock, Ticks};
pub use transceiver::{BusTransceiver, PollError, TransceiverConfig};

pub use gcn_proto;
pub use nes_proto;
