#![warn(missing_docs)]

//! This crate provides a simulated GPIO bank to run the `soft-i2c` engines
//! against each other locally.
//!
//! # Example
//! ```rust
//! use simulator::{PINS, simulator};
//! use soft_i2c::{
//!     DEFAULT_FREQUENCY, EdgeHandler, SyncI2cController, Target, TargetConfig, TargetEvent,
//! };
//!
//! let (bus, mut controller) = simulator(DEFAULT_FREQUENCY).unwrap();
//!
//! let respond = |data: &mut u8, _index: usize, event: TargetEvent| {
//!     if event == TargetEvent::Request {
//!         *data = 0x99;
//!     }
//! };
//! let config = TargetConfig::new(PINS, 0x42);
//! let mut target = Target::new(bus.lines(PINS), &config, respond).unwrap();
//! bus.set_irq_callback(move |pin, edge| {
//!     target.on_pin_edge(pin, edge);
//! });
//!
//! let mut response = [0];
//! controller.read(0x42, &mut response).unwrap();
//! assert_eq!(response, [0x99]);
//! ```

use fugit::HertzU32;
use soft_i2c::{ConfigError, Controller, ControllerConfig, PinId, PinPair};

pub use bus::{SimBus, SimError, SimLines};
pub use sink::{ChannelSink, FrameReceiver, channel_sink};

pub mod bus;
pub mod sink;

/// Data pin used by [`simulator`]
pub const SDA: PinId = 4;
/// Clock pin used by [`simulator`]
pub const SCL: PinId = 5;
/// [`SDA`] and [`SCL`]
pub const PINS: PinPair = PinPair::new(SDA, SCL);

/// Create a bus and a controller attached to [`PINS`]
///
/// Targets and sniffers get their lines from [`SimBus::lines`] and are driven
/// from the callback installed with [`SimBus::set_irq_callback`].
pub fn simulator(frequency: HertzU32) -> Result<(SimBus, Controller<SimLines>), ConfigError> {
    let bus = SimBus::new();
    let config = ControllerConfig::new(PINS, frequency);
    let controller = Controller::new(bus.lines(PINS), &config)?;
    Ok((bus, controller))
}
