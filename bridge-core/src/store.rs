//! Last decoded report and change detection.

use gcn_proto::{ControllerReport, REPORT_SIZE};

/// Holds the most recent decoded report and the one last handed to the
/// mapping stage.
///
/// Both copies start zeroed. [`changed`](ReportStore::changed) reports true on
/// its first call regardless, so the first mapping pass always happens.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportStore {
    last_built: [u8; REPORT_SIZE],
    last_sent: [u8; REPORT_SIZE],
    first: bool,
}

impl ReportStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_built: [0; REPORT_SIZE],
            last_sent: [0; REPORT_SIZE],
            first: true,
        }
    }

    /// Record a freshly decoded report. Only call with a confirmed decode.
    pub fn update(&mut self, report: &ControllerReport) {
        self.last_built = report.as_bytes();
    }

    /// True if the latest report differs from the one last built, or if this
    /// is the first call.
    pub fn changed(&mut self) -> bool {
        if self.first {
            self.first = false;
            return true;
        }
        self.last_built != self.last_sent
    }

    /// Mark the latest report as delivered and return it, optionally copying
    /// its bytes into `dest`.
    pub fn build(&mut self, dest: Option<&mut [u8; REPORT_SIZE]>) -> ControllerReport {
        self.last_sent = self.last_built;
        if let Some(dest) = dest {
            *dest = self.last_built;
        }
        ControllerReport::from_bytes(&self.last_built)
    }

    /// The latest report, delivered or not.
    #[must_use]
    pub fn latest(&self) -> ControllerReport {
        ControllerReport::from_bytes(&self.last_built)
    }
}

impl Default for ReportStore {
    fn default() -> Self {
        Self::new()
    }
}
