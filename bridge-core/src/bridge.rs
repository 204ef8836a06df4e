//! Bridge: the main-loop side of the adapter.

use gcn_proto::ControllerReport;

use crate::emulator::{HostPollSignal, ShiftRegister};
use crate::mapping::{Mapper, MappingMode};
use crate::scheduler::{PollScheduler, SchedulerConfig};
use crate::store::ReportStore;
use crate::timing::{SingleWireLine, TickClock, Ticks};
use crate::transceiver::{BusTransceiver, PollError};

/// What one [`Bridge::service`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Not yet time to poll the controller.
    Waiting,
    /// Polled, nothing new to serve.
    Unchanged,
    /// Polled and published this wire byte.
    Published(u8),
    /// The poll failed. The byte being served stays as it was.
    Failed(PollError),
}

/// Polls the controller when the scheduler allows it and publishes the
/// mapped byte to the latch handler.
///
/// The bridge never talks to the downstream port itself: it only writes the
/// [`ShiftRegister`] and reads the [`HostPollSignal`].
pub struct Bridge<'a, L, C> {
    transceiver: BusTransceiver<L, C>,
    store: ReportStore,
    scheduler: PollScheduler,
    mapper: Mapper,
    register: &'a ShiftRegister,
    signal: &'a HostPollSignal,
}

impl<'a, L: SingleWireLine, C: TickClock> Bridge<'a, L, C> {
    pub fn new(
        transceiver: BusTransceiver<L, C>,
        scheduler: SchedulerConfig,
        register: &'a ShiftRegister,
        signal: &'a HostPollSignal,
    ) -> Self {
        Self {
            transceiver,
            store: ReportStore::new(),
            scheduler: PollScheduler::new(scheduler, 0),
            mapper: Mapper::default(),
            register,
            signal,
        }
    }

    /// Release the upstream line. Give the controller time to power up
    /// before [`start`](Self::start).
    pub fn initialize(&mut self) {
        self.transceiver.initialize();
    }

    /// Read the controller once, pick the mapping mode from the buttons held
    /// and publish the first byte. Scheduling starts at `now`.
    pub fn start(&mut self, now: Ticks) -> MappingMode {
        let report = match self.transceiver.poll() {
            Ok(report) => {
                info!("controller answered");
                self.store.update(&report);
                self.store.build(None)
            }
            Err(err) => {
                // Serve nothing pressed until a poll succeeds.
                warn!("no controller at startup: {:?}", err);
                ControllerReport::neutral()
            }
        };

        let mode = MappingMode::select(&report);
        info!("mapping mode: {:?}", mode);

        self.mapper = Mapper::new(mode);
        self.register.publish(self.mapper.map(&report).to_wire());

        let _ = self.signal.take();
        self.scheduler.restart(now);
        mode
    }

    /// One main-loop iteration.
    pub fn service(&mut self, now: Ticks) -> Step {
        if let Some(at) = self.signal.take() {
            self.scheduler.on_host_polled(at);
        }

        if !self.scheduler.may_poll_now(now) {
            return Step::Waiting;
        }

        let report = match self.transceiver.poll() {
            Ok(report) => report,
            Err(err) => {
                warn!("controller poll failed: {:?}", err);
                return Step::Failed(err);
            }
        };

        self.store.update(&report);
        if !self.store.changed() {
            return Step::Unchanged;
        }

        let report = self.store.build(None);
        let byte = self.mapper.map(&report).to_wire();
        self.register.publish(byte);
        Step::Published(byte)
    }

    /// The report the current byte was mapped from.
    #[must_use]
    pub fn latest_report(&self) -> ControllerReport {
        self.store.latest()
    }

    #[must_use]
    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }
}
