//! Bit-banged controller (master)

use fugit::MicrosDurationU32;
use log::{debug, trace, warn};

use crate::config::{ConfigError, ControllerConfig, MAX_ATTEMPTS};
use crate::fifo::Fifo8;
use crate::lines::{Direction, Line, Lines, PinPair};
use crate::state::{AddressConditions, ProtocolState};
use crate::{
    ErrorKind, ErrorType, NoAcknowledgeSource, Operation, SevenBitAddress, SyncI2cController,
};

/// I2C controller driving both lines from the foreground thread.
///
/// Every bit is one clock pulse built from whole multiples of the delay unit
/// derived from [`ControllerConfig::delay`]. The controller never stretches
/// the clock and never arbitrates.
///
/// Failed acknowledges are retried [`MAX_ATTEMPTS`] times, after which a stop
/// condition is issued and [`ErrorKind::NoAcknowledge`] returned.
pub struct Controller<L> {
    lines: L,
    pins: PinPair,
    delay: MicrosDurationU32,
    state: ProtocolState,
}

impl<L: Lines> Controller<L> {
    pub fn new(lines: L, config: &ControllerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            lines,
            pins: config.pins,
            delay: config.delay()?,
            state: ProtocolState::Idle,
        })
    }

    pub fn pins(&self) -> PinPair {
        self.pins
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn free(self) -> L {
        self.lines
    }

    fn delay(&mut self) {
        self.lines.delay(self.delay);
    }

    fn bus<T>(result: Result<T, L::Error>) -> Result<T, ErrorKind> {
        result.map_err(|e| {
            warn!("line access failed: {e:?}");
            ErrorKind::Bus
        })
    }

    fn set(&mut self, line: Line, level: bool) -> Result<(), ErrorKind> {
        Self::bus(self.lines.write(line, level))
    }

    fn direction(&mut self, line: Line, direction: Direction) -> Result<(), ErrorKind> {
        Self::bus(self.lines.set_direction(line, direction))
    }

    fn get_sda(&mut self) -> Result<bool, ErrorKind> {
        Self::bus(self.lines.read(Line::Sda))
    }

    /// SDA falls while SCL is high.
    pub fn start_condition(&mut self) -> Result<(), ErrorKind> {
        self.direction(Line::Scl, Direction::Output)?;
        self.direction(Line::Sda, Direction::Output)?;

        self.set(Line::Sda, true)?;
        self.set(Line::Scl, true)?;
        self.delay();
        self.set(Line::Sda, false)?;
        self.delay();
        self.set(Line::Scl, false)?;
        self.delay();

        self.state = ProtocolState::Started;
        Ok(())
    }

    /// SDA rises while SCL is high.
    pub fn stop_condition(&mut self) -> Result<(), ErrorKind> {
        self.set(Line::Sda, false)?;
        self.set(Line::Scl, false)?;
        self.delay();
        self.set(Line::Scl, true)?;
        self.delay();
        self.set(Line::Sda, true)?;
        self.delay();

        self.state = ProtocolState::Stopped;
        Ok(())
    }

    /// One clock pulse with SDA set up while SCL is low.
    pub fn write_bit(&mut self, bit: bool) -> Result<(), ErrorKind> {
        self.set(Line::Sda, bit)?;
        self.delay();
        self.set(Line::Scl, true)?;
        self.delay();
        self.set(Line::Scl, false)?;
        self.delay();
        Ok(())
    }

    /// One clock pulse, sampling SDA while SCL is high. SDA must be released.
    pub fn read_bit(&mut self) -> Result<bool, ErrorKind> {
        self.delay();
        self.set(Line::Scl, true)?;
        let bit = self.get_sda()?;
        self.delay();
        self.set(Line::Scl, false)?;
        self.delay();
        Ok(bit)
    }

    /// Clock the ninth bit with SDA released. Low is an acknowledge.
    fn read_acknowledge(&mut self) -> Result<bool, ErrorKind> {
        self.direction(Line::Sda, Direction::Input)?;
        self.delay();

        self.set(Line::Scl, true)?;
        self.delay();
        let acknowledged = !self.get_sda()?;

        self.set(Line::Scl, false)?;
        self.direction(Line::Sda, Direction::Output)?;
        self.delay();

        trace!("acknowledge: {acknowledged}");
        Ok(acknowledged)
    }

    fn shift_out(&mut self, byte: u8) -> Result<bool, ErrorKind> {
        let mut fifo = Fifo8::with(byte);
        for _ in 0..8 {
            let bit = fifo.shift_in(false);
            self.write_bit(bit)?;
        }
        self.read_acknowledge()
    }

    /// Send `byte` MSB first and return whether it was acknowledged.
    pub fn write_byte(&mut self, byte: u8) -> Result<bool, ErrorKind> {
        self.state = ProtocolState::Transmitting;
        self.shift_out(byte)
    }

    /// Clock in one byte MSB first, then acknowledge it, or end the
    /// transaction with a stop condition when `is_last`.
    pub fn read_byte(&mut self, is_last: bool) -> Result<u8, ErrorKind> {
        self.state = ProtocolState::Receiving;
        self.direction(Line::Sda, Direction::Input)?;
        self.delay();

        let mut fifo = Fifo8::new();
        for _ in 0..8 {
            let bit = self.read_bit()?;
            fifo.shift_in(bit);
        }

        self.direction(Line::Sda, Direction::Output)?;
        if is_last {
            self.stop_condition()?;
        } else {
            self.write_bit(false)?;
        }

        Ok(fifo.data())
    }

    /// Start condition followed by the address and direction bit. Returns
    /// whether a target acknowledged.
    pub fn start_communication(
        &mut self,
        address: SevenBitAddress,
        is_read: bool,
    ) -> Result<bool, ErrorKind> {
        self.start_condition()?;
        self.state = ProtocolState::AddressPhase;

        let conditions = AddressConditions::controller(address);
        let byte = if is_read {
            conditions.receive
        } else {
            conditions.transmit
        };
        self.shift_out(byte)
    }

    fn with_retries(
        &mut self,
        mut attempt: impl FnMut(&mut Self) -> Result<bool, ErrorKind>,
    ) -> Result<bool, ErrorKind> {
        for n in 1..=MAX_ATTEMPTS {
            if attempt(self)? {
                return Ok(true);
            }
            debug!("not acknowledged, attempt {n} of {MAX_ATTEMPTS}");
        }
        Ok(false)
    }

    fn abort(&mut self, source: NoAcknowledgeSource) -> Result<(), ErrorKind> {
        warn!("giving up after {MAX_ATTEMPTS} attempts: {source:?} not acknowledged");
        self.stop_condition()?;
        Err(ErrorKind::NoAcknowledge(source))
    }

    fn address(&mut self, address: SevenBitAddress, is_read: bool) -> Result<(), ErrorKind> {
        if address > 0x7f {
            return Err(ErrorKind::Other);
        }
        if self.with_retries(|c| c.start_communication(address, is_read))? {
            debug!("{address:#04x} acknowledged {}", if is_read { "read" } else { "write" });
            Ok(())
        } else {
            self.abort(NoAcknowledgeSource::Address)
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
        for &byte in data {
            if !self.with_retries(|c| c.write_byte(byte))? {
                return self.abort(NoAcknowledgeSource::Data);
            }
        }
        Ok(())
    }

    /// Write `data` to the target at `address`, ending with a stop condition.
    pub fn write_bytes(&mut self, address: SevenBitAddress, data: &[u8]) -> Result<(), ErrorKind> {
        self.address(address, false)?;
        self.send(data)?;
        self.stop_condition()
    }

    /// Fill `data` from the target at `address`. The stop condition takes the
    /// place of the last acknowledge.
    ///
    /// An empty `data` leaves the bus untouched: a target that acknowledged
    /// its read address would already be driving the first bit of a byte
    /// nobody clocks out.
    pub fn read_bytes(
        &mut self,
        address: SevenBitAddress,
        data: &mut [u8],
    ) -> Result<(), ErrorKind> {
        if data.is_empty() {
            return Ok(());
        }
        self.address(address, true)?;

        let last = data.len() - 1;
        for (i, slot) in data.iter_mut().enumerate() {
            *slot = self.read_byte(i == last)?;
        }
        Ok(())
    }
}

impl<L: Lines> ErrorType for Controller<L> {
    type Error = ErrorKind;
}

impl<L: Lines> SyncI2cController<SevenBitAddress> for Controller<L> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let is_read = |op: &Operation<'_>| matches!(op, Operation::Read(_));
        // Empty reads are skipped for the same reason as in `read_bytes`
        let is_empty_read =
            |op: &Operation<'_>| matches!(op, Operation::Read(b) if b.is_empty());

        let mut previous = None;
        for i in 0..operations.len() {
            if is_empty_read(&operations[i]) {
                continue;
            }
            let next = operations[i + 1..]
                .iter()
                .find(|op| !is_empty_read(*op))
                .map(is_read);
            let current = is_read(&operations[i]);

            // Adjacent operations of the same kind share one address phase
            if previous != Some(current) {
                self.address(address, current)?;
            }
            previous = Some(current);

            match &mut operations[i] {
                Operation::Write(data) => self.send(data)?,
                Operation::Read(buffer) => {
                    // Targets re-offer a byte that is not acknowledged, so a
                    // read run always ends in a stop, even before a write.
                    let last = buffer.len().saturating_sub(1);
                    for (j, slot) in buffer.iter_mut().enumerate() {
                        *slot = self.read_byte(j == last && next != Some(true))?;
                    }
                }
            }
        }

        if previous.is_some() && self.state != ProtocolState::Stopped {
            self.stop_condition()?;
        }
        Ok(())
    }
}
