//! GameCube report to NES buttons.

use gcn_proto::{Buttons, ControllerReport, Dpad, AXIS_CENTER};
use nes_proto::NesButtons;

/// Stick deflection from centre that presses a direction.
pub const AXIS_THRESHOLD: u8 = 32;

/// Stick deflection from centre that also presses B in [`MappingMode::Autorun`].
pub const RUN_THRESHOLD: u8 = 64;

/// How the main stick and buttons translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MappingMode {
    /// Face buttons, Z as Select, d-pad and main stick as directions.
    #[default]
    Standard,
    /// Like [`Standard`](Self::Standard), and a stick pushed far enough also
    /// holds B, which is run in most platformers.
    Autorun,
}

impl MappingMode {
    /// Mode picked by the buttons held at power-up: A selects autorun.
    #[must_use]
    pub const fn select(report: &ControllerReport) -> Self {
        if report.buttons.contains(Buttons::A) {
            Self::Autorun
        } else {
            Self::Standard
        }
    }
}

/// Turns decoded reports into NES button bytes.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mapper {
    mode: MappingMode,
    /// Whether turbo releases A/B on the next pass.
    turbo_release: bool,
}

impl Mapper {
    #[must_use]
    pub const fn new(mode: MappingMode) -> Self {
        Self {
            mode,
            turbo_release: true,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> MappingMode {
        self.mode
    }

    /// Map one report. Holding L turns A and B into turbo buttons: they are
    /// released on every other call.
    pub fn map(&mut self, report: &ControllerReport) -> NesButtons {
        let mut nes = NesButtons::NONE;

        nes.set(NesButtons::A, report.buttons.contains(Buttons::A));
        nes.set(NesButtons::B, report.buttons.contains(Buttons::B));
        nes.set(NesButtons::SELECT, report.buttons.contains(Buttons::Z));
        nes.set(NesButtons::START, report.buttons.contains(Buttons::START));
        nes.set(NesButtons::UP, report.dpad.contains(Dpad::UP));
        nes.set(NesButtons::DOWN, report.dpad.contains(Dpad::DOWN));
        nes.set(NesButtons::LEFT, report.dpad.contains(Dpad::LEFT));
        nes.set(NesButtons::RIGHT, report.dpad.contains(Dpad::RIGHT));

        // Y is already flipped on decode: up is below centre.
        let run = match self.mode {
            MappingMode::Standard => None,
            MappingMode::Autorun => Some(NesButtons::B),
        };
        axis_to_buttons(&mut nes, report.stick.x, NesButtons::LEFT, NesButtons::RIGHT, run);
        axis_to_buttons(&mut nes, report.stick.y, NesButtons::UP, NesButtons::DOWN, run);

        if report.buttons.contains(Buttons::L) && self.turbo_release {
            nes.release(NesButtons::A);
            nes.release(NesButtons::B);
        }
        self.turbo_release = !self.turbo_release;

        nes
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new(MappingMode::Standard)
    }
}

/// Press `low` or `high` past [`AXIS_THRESHOLD`], and `run` as well past
/// [`RUN_THRESHOLD`].
fn axis_to_buttons(
    nes: &mut NesButtons,
    value: u8,
    low: NesButtons,
    high: NesButtons,
    run: Option<NesButtons>,
) {
    let deflection = i16::from(value) - i16::from(AXIS_CENTER);

    let direction = if deflection < -i16::from(AXIS_THRESHOLD) {
        low
    } else if deflection > i16::from(AXIS_THRESHOLD) {
        high
    } else {
        return;
    };
    nes.press(direction);

    if let Some(run) = run {
        if deflection.abs() > i16::from(RUN_THRESHOLD) {
            nes.press(run);
        }
    }
}
