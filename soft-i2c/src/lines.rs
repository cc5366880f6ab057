//! Access to the two bus lines and the delay unit

use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, Error as _, InputPin, OutputPin, PinState};
use fugit::MicrosDurationU32;

/// Platform identity of a GPIO pin, as reported with every edge interrupt.
pub type PinId = u8;

/// The data and clock pin of one bus.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PinPair {
    pub sda: PinId,
    pub scl: PinId,
}

impl PinPair {
    pub const fn new(sda: PinId, scl: PinId) -> Self {
        Self { sda, scl }
    }

    /// Which of our lines `pin` is, if any.
    pub const fn line_of(&self, pin: PinId) -> Option<Line> {
        if pin == self.sda {
            Some(Line::Sda)
        } else if pin == self.scl {
            Some(Line::Scl)
        } else {
            None
        }
    }

    pub const fn pin(&self, line: Line) -> PinId {
        match line {
            Line::Sda => self.sda,
            Line::Scl => self.scl,
        }
    }

    pub const fn overlaps(&self, other: &PinPair) -> bool {
        self.line_of(other.sda).is_some() || self.line_of(other.scl).is_some()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Line {
    Sda,
    Scl,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Level of the line right after this edge.
    pub const fn level(self) -> bool {
        matches!(self, Self::Rising)
    }
}

/// Physical access to SDA and SCL.
///
/// Lines are open drain: writing `true` or switching to [`Direction::Input`]
/// releases the line to its pull-up, writing `false` while in
/// [`Direction::Output`] pulls it low. A direction change has settled by the
/// time the next call returns.
pub trait Lines {
    type Error: Debug;

    fn read(&mut self, line: Line) -> Result<bool, Self::Error>;

    fn write(&mut self, line: Line, level: bool) -> Result<(), Self::Error>;

    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), Self::Error>;

    /// Busy or sleep wait. Never called from an edge handler.
    fn delay(&mut self, duration: MicrosDurationU32);
}

/// Last observed level of each line.
///
/// `sda` is written only by the data line handler and `scl` only by the clock
/// line handler. Each handler reads the other's field, which relies on the
/// platform delivering an edge before any edge that follows it on the other
/// line.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BusLevels {
    pub sda: bool,
    pub scl: bool,
}

impl BusLevels {
    /// Both lines released.
    pub const IDLE: Self = Self {
        sda: true,
        scl: true,
    };

    pub fn observe(&mut self, line: Line, edge: Edge) {
        match line {
            Line::Sda => self.sda = edge.level(),
            Line::Scl => self.scl = edge.level(),
        }
    }
}

impl Default for BusLevels {
    fn default() -> Self {
        Self::IDLE
    }
}

#[derive(Debug, Clone, Copy)]
struct Drive {
    direction: Direction,
    level: bool,
}

impl Drive {
    const RELEASED: Self = Self {
        direction: Direction::Input,
        level: true,
    };

    const fn pin_state(self) -> PinState {
        match (self.direction, self.level) {
            (Direction::Output, false) => PinState::Low,
            _ => PinState::High,
        }
    }
}

/// [`Lines`] on top of two `embedded-hal` open-drain pins and a delay.
///
/// The pins must be configured as open-drain outputs with input enabled, so
/// that driving them high releases the line and reading them returns the
/// actual bus level. "Input" direction is emulated by releasing.
pub struct OpenDrainLines<SDA, SCL, D> {
    sda: SDA,
    scl: SCL,
    delay: D,
    sda_drive: Drive,
    scl_drive: Drive,
}

impl<SDA, SCL, D> OpenDrainLines<SDA, SCL, D> {
    pub const fn new(sda: SDA, scl: SCL, delay: D) -> Self {
        Self {
            sda,
            scl,
            delay,
            sda_drive: Drive::RELEASED,
            scl_drive: Drive::RELEASED,
        }
    }

    pub fn release(self) -> (SDA, SCL, D) {
        (self.sda, self.scl, self.delay)
    }
}

impl<SDA, SCL, D> OpenDrainLines<SDA, SCL, D>
where
    SDA: OutputPin,
    SCL: OutputPin,
{
    fn apply(&mut self, line: Line) -> Result<(), digital::ErrorKind> {
        match line {
            Line::Sda => self
                .sda
                .set_state(self.sda_drive.pin_state())
                .map_err(|e| e.kind()),
            Line::Scl => self
                .scl
                .set_state(self.scl_drive.pin_state())
                .map_err(|e| e.kind()),
        }
    }

    fn drive_mut(&mut self, line: Line) -> &mut Drive {
        match line {
            Line::Sda => &mut self.sda_drive,
            Line::Scl => &mut self.scl_drive,
        }
    }
}

impl<SDA, SCL, D> Lines for OpenDrainLines<SDA, SCL, D>
where
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin,
    D: DelayNs,
{
    type Error = digital::ErrorKind;

    fn read(&mut self, line: Line) -> Result<bool, Self::Error> {
        match line {
            Line::Sda => self.sda.is_high().map_err(|e| e.kind()),
            Line::Scl => self.scl.is_high().map_err(|e| e.kind()),
        }
    }

    fn write(&mut self, line: Line, level: bool) -> Result<(), Self::Error> {
        self.drive_mut(line).level = level;
        self.apply(line)
    }

    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), Self::Error> {
        self.drive_mut(line).direction = direction;
        self.apply(line)
    }

    fn delay(&mut self, duration: MicrosDurationU32) {
        self.delay.delay_us(duration.to_micros());
    }
}
