use soft_i2c::{ErrorKind, SevenBitAddress, SyncI2cController};

/// Controller side of a [`crate::Counter`] target.
pub struct CounterClient<I> {
    i2c: I,
    address: SevenBitAddress,
}

impl<I> CounterClient<I>
where
    I: SyncI2cController,
{
    pub const fn new(i2c: I, address: SevenBitAddress) -> CounterClient<I> {
        CounterClient { i2c, address }
    }

    pub fn store(&mut self, value: u8) -> Result<(), Error<I::Error>> {
        self.i2c
            .write(self.address, &[value])
            .map_err(Error::from_bus)
    }

    pub fn fetch(&mut self) -> Result<u8, Error<I::Error>> {
        let mut buf = [0];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(Error::from_bus)?;
        Ok(buf[0])
    }

    /// Store `value` and read back its successor in one transaction.
    pub fn exchange(&mut self, value: u8) -> Result<u8, Error<I::Error>> {
        let mut buf = [0];
        self.i2c
            .write_read(self.address, &[value], &mut buf)
            .map_err(Error::from_bus)?;
        Ok(buf[0])
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error<I2cErr> {
    I2c(I2cErr),
    NotResponding,
}

impl<I2cErr: soft_i2c::Error> Error<I2cErr> {
    fn from_bus(e: I2cErr) -> Self {
        match e.kind() {
            ErrorKind::NoAcknowledge(_) => Error::NotResponding,
            _ => Error::I2c(e),
        }
    }
}
