//! Routing of pin edge interrupts to engine instances

use heapless::Vec;
use log::{debug, trace};

use crate::config::{ConfigError, MAX_TARGETS};
use crate::lines::{Edge, Line, PinId, PinPair};

/// An engine that consumes edges of its two lines.
pub trait EdgeHandler {
    fn pins(&self) -> PinPair;

    fn on_edge(&mut self, line: Line, edge: Edge);

    /// Forwards the edge if `pin` is one of ours.
    fn on_pin_edge(&mut self, pin: PinId, edge: Edge) -> bool {
        match self.pins().line_of(pin) {
            Some(line) => {
                self.on_edge(line, edge);
                true
            }
            None => false,
        }
    }
}

impl<T: EdgeHandler + ?Sized> EdgeHandler for &mut T {
    fn pins(&self) -> PinPair {
        (**self).pins()
    }

    fn on_edge(&mut self, line: Line, edge: Edge) {
        (**self).on_edge(line, edge)
    }
}

/// Fixed-capacity table of engines, looked up by the pin an interrupt fired
/// on.
///
/// Filled during initialization and then only used for dispatch. No two
/// registered instances share a pin.
pub struct Registry<H, const N: usize = MAX_TARGETS> {
    handlers: Vec<H, N>,
}

impl<H: EdgeHandler, const N: usize> Registry<H, N> {
    pub const fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Adds an instance, returning its index.
    pub fn register(&mut self, handler: H) -> Result<usize, ConfigError> {
        let pins = handler.pins();
        if let Some(taken) = self.handlers.iter().find(|h| h.pins().overlaps(&pins)) {
            let taken = taken.pins();
            let pin = if taken.line_of(pins.sda).is_some() {
                pins.sda
            } else {
                pins.scl
            };
            return Err(ConfigError::PinInUse(pin));
        }

        self.handlers
            .push(handler)
            .map_err(|_| ConfigError::RegistryFull { capacity: N })?;

        debug!("registered instance on sda {} scl {}", pins.sda, pins.scl);
        Ok(self.handlers.len() - 1)
    }

    /// Entry point for the platform's edge interrupt.
    ///
    /// Returns whether some instance owns `pin`.
    pub fn dispatch(&mut self, pin: PinId, edge: Edge) -> bool {
        let handled = self
            .handlers
            .iter_mut()
            .any(|handler| handler.on_pin_edge(pin, edge));
        if !handled {
            trace!("edge on unclaimed pin {pin}");
        }
        handled
    }

    pub fn get(&self, index: usize) -> Option<&H> {
        self.handlers.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut H> {
        self.handlers.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H: EdgeHandler, const N: usize> Default for Registry<H, N> {
    fn default() -> Self {
        Self::new()
    }
}
