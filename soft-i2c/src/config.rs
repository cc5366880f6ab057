//! Configuration inputs for the engines

use core::fmt;

use fugit::{HertzU32, MicrosDurationU32};

use crate::SevenBitAddress;
use crate::lines::{PinId, PinPair};
use crate::state::AddressConditions;

/// Standard mode bus clock.
pub const DEFAULT_FREQUENCY: HertzU32 = HertzU32::from_raw(100_000);

/// How often the controller tries an address or a data byte before giving up.
pub const MAX_ATTEMPTS: usize = 3;

/// Default capacity of a [`crate::Registry`].
pub const MAX_TARGETS: usize = 16;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    /// Only 7-bit addresses are supported.
    InvalidAddress(u8),
    ZeroFrequency,
    /// The pin already belongs to a registered instance.
    PinInUse(PinId),
    RegistryFull { capacity: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress(address) => write!(f, "{address:#04x} is not a 7-bit address"),
            Self::ZeroFrequency => f.write_str("bus frequency must be non-zero"),
            Self::PinInUse(pin) => write!(f, "pin {pin} is already in use"),
            Self::RegistryFull { capacity } => {
                write!(f, "no room for more than {capacity} instances")
            }
        }
    }
}

impl core::error::Error for ConfigError {}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ControllerConfig {
    pub pins: PinPair,
    pub frequency: HertzU32,
}

impl ControllerConfig {
    pub const fn new(pins: PinPair, frequency: HertzU32) -> Self {
        Self { pins, frequency }
    }

    /// The delay unit all bit timing is built from: one period of
    /// `frequency`, at least one microsecond.
    pub fn delay(&self) -> Result<MicrosDurationU32, ConfigError> {
        let hz = self.frequency.to_Hz();
        if hz == 0 {
            return Err(ConfigError::ZeroFrequency);
        }
        Ok(MicrosDurationU32::from_ticks((1_000_000 / hz).max(1)))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TargetConfig {
    pub pins: PinPair,
    pub address: SevenBitAddress,
}

impl TargetConfig {
    pub const fn new(pins: PinPair, address: SevenBitAddress) -> Self {
        Self { pins, address }
    }

    pub fn conditions(&self) -> Result<AddressConditions, ConfigError> {
        if self.address > 0x7f {
            return Err(ConfigError::InvalidAddress(self.address));
        }
        Ok(AddressConditions::target(self.address))
    }
}
