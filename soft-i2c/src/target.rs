//! Edge driven target (slave)

use log::{debug, trace, warn};

use crate::config::{ConfigError, TargetConfig};
use crate::dispatch::EdgeHandler;
use crate::fifo::Fifo8;
use crate::lines::{BusLevels, Direction, Edge, Line, Lines, PinPair};
use crate::state::{AckPhase, AddressConditions, ProtocolState};

/// Why the [`EventHandler`] is called.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TargetEvent {
    /// A start condition was seen. The address is not known yet.
    Start,
    /// A byte written by the controller was received.
    Receive,
    /// The controller reads, the handler must provide the next byte.
    Request,
    /// A stop condition was seen.
    Stop,
}

/// Application side of a [`Target`].
///
/// Called synchronously from the edge handler, so it runs in interrupt
/// context and must return quickly. `byte_index` counts the bytes of the
/// current transaction starting at 1, and is 0 for `Start` and `Stop`.
pub trait EventHandler {
    fn on_event(&mut self, data: &mut u8, byte_index: usize, event: TargetEvent);
}

impl<F> EventHandler for F
where
    F: FnMut(&mut u8, usize, TargetEvent),
{
    fn on_event(&mut self, data: &mut u8, byte_index: usize, event: TargetEvent) {
        self(data, byte_index, event)
    }
}

/// I2C target built from two edge handlers.
///
/// Data is sampled on rising clock edges and driven on falling clock edges,
/// so SDA only ever changes while SCL is low. An SDA edge while SCL is high
/// is a start or stop condition.
///
/// While a byte moves, `bit_counter` counts clock pulses modulo 9: positions
/// 0 to 7 are data bits and position 8 is that byte's acknowledge. The
/// acknowledge after the address byte is tracked by the [`AckPhase`] alone.
pub struct Target<L, H> {
    lines: L,
    pins: PinPair,
    conditions: AddressConditions,
    handler: H,
    levels: BusLevels,
    fifo: Fifo8,
    state: ProtocolState,
    ack: AckPhase,
    bit_counter: usize,
    holding_sda: bool,
    last_sent: u8,
    replay: Option<u8>,
}

impl<L: Lines, H: EventHandler> Target<L, H> {
    /// The bus is assumed idle with SDA released when the target is created.
    pub fn new(lines: L, config: &TargetConfig, handler: H) -> Result<Self, ConfigError> {
        Ok(Self {
            lines,
            pins: config.pins,
            conditions: config.conditions()?,
            handler,
            levels: BusLevels::IDLE,
            fifo: Fifo8::new(),
            state: ProtocolState::Idle,
            ack: AckPhase::None,
            bit_counter: 0,
            holding_sda: false,
            last_sent: 0,
            replay: None,
        })
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn ack_phase(&self) -> AckPhase {
        self.ack
    }

    pub fn bit_counter(&self) -> usize {
        self.bit_counter
    }

    pub fn conditions(&self) -> AddressConditions {
        self.conditions
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn on_sda_edge(&mut self, edge: Edge) {
        self.levels.observe(Line::Sda, edge);

        // SDA may change freely while SCL is low
        if !self.levels.scl {
            return;
        }

        let result = match edge {
            Edge::Falling => self.reset(ProtocolState::Started),
            Edge::Rising => self.reset(ProtocolState::Idle),
        };
        if result.is_err() {
            self.recover(result);
            return;
        }

        let event = match edge {
            Edge::Falling => TargetEvent::Start,
            Edge::Rising => TargetEvent::Stop,
        };
        trace!("{event:?}");
        self.notify(0, event);
    }

    pub fn on_scl_edge(&mut self, edge: Edge) {
        self.levels.observe(Line::Scl, edge);

        let result = match edge {
            Edge::Rising => {
                self.sample();
                Ok(())
            }
            Edge::Falling => self.drive(),
        };
        self.recover(result);
    }

    /// Back to a clean `state`, letting go of SDA.
    ///
    /// Calling this twice in a row leaves the target exactly as calling it
    /// once does.
    pub fn reset(&mut self, state: ProtocolState) -> Result<(), L::Error> {
        self.state = state;
        self.ack = AckPhase::None;
        self.bit_counter = 0;
        self.fifo.reset();
        self.replay = None;
        self.release_sda()
    }

    fn recover(&mut self, result: Result<(), L::Error>) {
        if let Err(e) = result {
            warn!("line access failed in edge handler: {e:?}");
            self.state = ProtocolState::Idle;
            self.ack = AckPhase::None;
            self.bit_counter = 0;
            self.fifo.reset();
            self.replay = None;
            self.holding_sda = false;
        }
    }

    fn notify(&mut self, byte_index: usize, event: TargetEvent) {
        let mut data = self.fifo.data();
        self.handler.on_event(&mut data, byte_index, event);
        self.fifo.load(data);
    }

    fn byte_index(&self) -> usize {
        self.bit_counter / 9 + 1
    }

    fn release_sda(&mut self) -> Result<(), L::Error> {
        if self.holding_sda {
            self.lines.set_direction(Line::Sda, Direction::Input)?;
            self.holding_sda = false;
        }
        Ok(())
    }

    fn pull_sda(&mut self) -> Result<(), L::Error> {
        if !self.holding_sda {
            self.lines.write(Line::Sda, false)?;
            self.lines.set_direction(Line::Sda, Direction::Output)?;
            self.holding_sda = true;
        }
        Ok(())
    }

    fn put_sda(&mut self, level: bool) -> Result<(), L::Error> {
        if level {
            self.release_sda()
        } else {
            self.pull_sda()
        }
    }

    /// Rising clock edge: SDA is stable and belongs to whoever sends.
    fn sample(&mut self) {
        let bit = self.levels.sda;

        match (self.state, self.ack) {
            (ProtocolState::Started | ProtocolState::AddressPhase, _) => {
                self.state = ProtocolState::AddressPhase;
                self.fifo.shift_in(bit);
                self.bit_counter += 1;
                if self.bit_counter == 8 {
                    self.match_address();
                }
            }
            // Our own acknowledge is on the bus, nothing to sample
            (ProtocolState::Transmitting | ProtocolState::Receiving, AckPhase::AwaitingTransmitAck) => {
                self.ack = AckPhase::None;
                if self.bit_counter % 9 == 8 {
                    self.bit_counter += 1;
                }
            }
            (ProtocolState::Transmitting, AckPhase::AwaitingReceiveAck) => {
                self.ack = AckPhase::None;
                self.bit_counter += 1;
                // Active low
                if bit {
                    debug!("byte {} not acknowledged, offering it again", self.byte_index() - 1);
                    self.bit_counter -= 9;
                    self.replay = Some(self.last_sent);
                }
            }
            (ProtocolState::Receiving, _) => {
                self.fifo.shift_in(bit);
                self.bit_counter += 1;
                if self.bit_counter % 9 == 8 {
                    let index = self.byte_index();
                    trace!("received byte {index}: {:#04x}", self.fifo.data());
                    self.notify(index, TargetEvent::Receive);
                    self.ack = AckPhase::AwaitingTransmitAck;
                }
            }
            _ => {}
        }
    }

    fn match_address(&mut self) {
        let byte = self.fifo.data();
        self.bit_counter = 0;
        self.fifo.reset();

        match self.conditions.classify(byte) {
            Some(state) => {
                debug!("address byte {byte:#04x} matched, {state:?}");
                self.state = state;
                self.ack = AckPhase::AwaitingTransmitAck;
            }
            None => {
                trace!("address byte {byte:#04x} is not ours");
                self.state = ProtocolState::Idle;
            }
        }
    }

    /// Falling clock edge: the window for changing SDA.
    fn drive(&mut self) -> Result<(), L::Error> {
        match (self.state, self.ack) {
            (ProtocolState::Transmitting | ProtocolState::Receiving, AckPhase::AwaitingTransmitAck) => {
                self.pull_sda()
            }
            (ProtocolState::Receiving, _) => self.release_sda(),
            (ProtocolState::Transmitting, AckPhase::None) => {
                if self.bit_counter % 9 == 8 {
                    // The controller acknowledges in this cycle
                    self.ack = AckPhase::AwaitingReceiveAck;
                    return self.release_sda();
                }

                if self.bit_counter % 9 == 0 {
                    match self.replay.take() {
                        Some(byte) => self.fifo.load(byte),
                        None => self.notify(self.byte_index(), TargetEvent::Request),
                    }
                    self.last_sent = self.fifo.data();
                }

                let bit = self.fifo.shift_in(false);
                self.bit_counter += 1;
                self.put_sda(bit)
            }
            _ => Ok(()),
        }
    }
}

impl<L: Lines, H: EventHandler> EdgeHandler for Target<L, H> {
    fn pins(&self) -> PinPair {
        self.pins
    }

    fn on_edge(&mut self, line: Line, edge: Edge) {
        match line {
            Line::Sda => self.on_sda_edge(edge),
            Line::Scl => self.on_scl_edge(edge),
        }
    }
}
