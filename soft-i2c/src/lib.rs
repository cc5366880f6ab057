#![cfg_attr(not(test), no_std)]

//! Bit-banged I2C built from nothing but GPIO levels, edge interrupts and
//! timed toggling.
//!
//! Three roles share one protocol engine:
//! - [`Controller`] drives both lines and implements the `embedded-hal`
//!   [`SyncI2cController`] trait.
//! - [`Target`] recognises its own address from line edges and answers the
//!   controller through an [`EventHandler`].
//! - [`Sniffer`] follows every transaction on the bus without touching it and
//!   hands a [`Frame`] per byte to a [`FrameSink`].
//!
//! Edge notifications from the platform are routed to the right engine by a
//! [`Registry`].

pub use embedded_hal::i2c::I2c as SyncI2cController;
pub use embedded_hal::i2c::{
    Error, ErrorKind, ErrorType, NoAcknowledgeSource, Operation, SevenBitAddress,
};

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod fifo;
pub mod frame;
pub mod lines;
pub mod sniffer;
pub mod state;
pub mod target;

pub use config::{
    ConfigError, ControllerConfig, DEFAULT_FREQUENCY, MAX_ATTEMPTS, MAX_TARGETS, TargetConfig,
};
pub use controller::Controller;
pub use dispatch::{EdgeHandler, Registry};
pub use fifo::Fifo8;
pub use frame::{FRAME_TAG, Frame, FrameDecoder, FrameError, FrameSink};
pub use lines::{BusLevels, Direction, Edge, Line, Lines, OpenDrainLines, PinId, PinPair};
pub use sniffer::Sniffer;
pub use state::{AckPhase, AddressConditions, ProtocolState};
pub use target::{EventHandler, Target, TargetEvent};
