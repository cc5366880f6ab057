//! Simulated GPIO bank with open-drain lines and edge interrupts

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use fugit::MicrosDurationU32;
use log::trace;
use soft_i2c::{Direction, Edge, Line, Lines, PinId, PinPair};

type IrqCallback = Box<dyn FnMut(PinId, Edge)>;

/// Error returned by [`SimLines`]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SimError {
    /// The [`SimBus`] these lines belonged to was dropped
    Detached,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => f.write_str("simulated bus no longer exists"),
        }
    }
}

impl std::error::Error for SimError {}

#[derive(Default)]
struct Pins {
    /// `(pin, owner)` for every owner pulling a pin low
    pulls: BTreeSet<(PinId, usize)>,
    forced: HashMap<PinId, bool>,
    levels: HashMap<PinId, bool>,
    pending: VecDeque<(PinId, Edge)>,
}

impl Pins {
    fn level(&self, pin: PinId) -> bool {
        self.levels.get(&pin).copied().unwrap_or(true)
    }

    fn resolve(&self, pin: PinId) -> bool {
        if let Some(&level) = self.forced.get(&pin) {
            return level;
        }
        self.pulls.range((pin, 0)..=(pin, usize::MAX)).next().is_none()
    }

    fn update(&mut self, pin: PinId) {
        let level = self.resolve(pin);
        if self.level(pin) == level {
            return;
        }

        self.levels.insert(pin, level);
        let edge = if level { Edge::Rising } else { Edge::Falling };
        trace!("pin {pin}: {edge:?}");
        self.pending.push_back((pin, edge));
    }
}

#[derive(Default)]
struct Inner {
    pins: RefCell<Pins>,
    irq: RefCell<Option<IrqCallback>>,
    dispatching: Cell<bool>,
    owners: Cell<usize>,
    elapsed_us: Cell<u64>,
}

impl Inner {
    /// Delivers queued edges one at a time, in order.
    ///
    /// Edges caused by the callback itself are queued behind the current one,
    /// so the callback is never re-entered.
    fn pump(&self) {
        if self.dispatching.replace(true) {
            return;
        }

        loop {
            let Some((pin, edge)) = self.pins.borrow_mut().pending.pop_front() else {
                break;
            };

            let callback = self.irq.borrow_mut().take();
            if let Some(mut callback) = callback {
                callback(pin, edge);
                let mut irq = self.irq.borrow_mut();
                if irq.is_none() {
                    *irq = Some(callback);
                }
            }
        }

        self.dispatching.set(false);
    }
}

/// A bank of open-drain GPIO pins, each with a pull-up.
///
/// A pin is low while any [`SimLines`] pulls it low or while it is forced
/// low. Every level change is delivered to the interrupt callback as an
/// [`Edge`]. Delays do not sleep, they only advance a simulated clock.
#[derive(Clone, Default)]
pub struct SimBus {
    inner: Rc<Inner>,
}

impl SimBus {
    /// Create a bank with all pins released
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines for a new device attached to `pins`
    ///
    /// Several devices may share the same pins, the bus is the wired-AND of
    /// all of them.
    pub fn lines(&self, pins: PinPair) -> SimLines {
        let owner = self.inner.owners.get();
        self.inner.owners.set(owner + 1);

        SimLines {
            bus: Rc::downgrade(&self.inner),
            owner,
            pins,
            sda: Drive::RELEASED,
            scl: Drive::RELEASED,
        }
    }

    /// Install the edge interrupt handler, replacing the previous one
    pub fn set_irq_callback(&self, callback: impl FnMut(PinId, Edge) + 'static) {
        let previous = self.inner.irq.replace(Some(Box::new(callback)));
        drop(previous);
    }

    /// Current level of `pin`
    pub fn level(&self, pin: PinId) -> bool {
        self.inner.pins.borrow().level(pin)
    }

    /// Force `pin` to a level regardless of what devices do, or hand it back
    /// with `None`
    pub fn force(&self, pin: PinId, level: Option<bool>) {
        {
            let mut pins = self.inner.pins.borrow_mut();
            match level {
                Some(level) => pins.forced.insert(pin, level),
                None => pins.forced.remove(&pin),
            };
            pins.update(pin);
        }
        self.inner.pump();
    }

    /// Total of all delays requested through this bus' lines
    pub fn elapsed_us(&self) -> u64 {
        self.inner.elapsed_us.get()
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

    fn pulls_low(self) -> bool {
        self.direction == Direction::Output && !self.level
    }
}

/// One device's view of two pins of a [`SimBus`]
pub struct SimLines {
    bus: Weak<Inner>,
    owner: usize,
    pins: PinPair,
    sda: Drive,
    scl: Drive,
}

impl SimLines {
    /// The pins these lines are attached to
    pub fn pins(&self) -> PinPair {
        self.pins
    }

    fn bus(&self) -> Result<Rc<Inner>, SimError> {
        self.bus.upgrade().ok_or(SimError::Detached)
    }

    fn drive_mut(&mut self, line: Line) -> &mut Drive {
        match line {
            Line::Sda => &mut self.sda,
            Line::Scl => &mut self.scl,
        }
    }

    fn apply(&mut self, line: Line) -> Result<(), SimError> {
        let inner = self.bus()?;
        let pin = self.pins.pin(line);
        let pull = *self.drive_mut(line);

        {
            let mut pins = inner.pins.borrow_mut();
            if pull.pulls_low() {
                pins.pulls.insert((pin, self.owner));
            } else {
                pins.pulls.remove(&(pin, self.owner));
            }
            pins.update(pin);
        }
        inner.pump();
        Ok(())
    }
}

impl Lines for SimLines {
    type Error = SimError;

    fn read(&mut self, line: Line) -> Result<bool, Self::Error> {
        let inner = self.bus()?;
        let level = inner.pins.borrow().level(self.pins.pin(line));
        Ok(level)
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
        if let Ok(inner) = self.bus() {
            let elapsed = inner.elapsed_us.get() + u64::from(duration.to_micros());
            inner.elapsed_us.set(elapsed);
        }
    }
}
