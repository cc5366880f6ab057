use log::info;
use soft_i2c::{EventHandler, SevenBitAddress, TargetEvent};


pub const TARGET_ADDR: SevenBitAddress = 0x42;

/// What a byte is shown on, typically a row of eight LEDs with bit 0 on the
/// first one.
pub trait Display {
    fn show(&mut self, value: u8);
}

/// Shows every byte that crosses the bus and answers reads with twice the
/// last byte written.
pub struct Mirror<D> {
    display: D,
    received: u8,
}

impl<D: Display> Mirror<D> {
    /// Reads before the first write are answered from 150.
    pub const fn new(display: D) -> Self {
        Self {
            display,
            received: 150,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn received(&self) -> u8 {
        self.received
    }
}

impl<D: Display> EventHandler for Mirror<D> {
    fn on_event(&mut self, data: &mut u8, _byte_index: usize, event: TargetEvent) {
        match event {
            TargetEvent::Start => {
                info!("I2C start");
                self.display.show(*data);
            }
            TargetEvent::Receive => {
                info!("I2C receive {:#04x}", *data);
                self.display.show(*data);
                self.received = *data;
            }
            TargetEvent::Request => {
                *data = self.received.wrapping_mul(2);
                info!("I2C request {:#04x}", *data);
                self.display.show(*data);
            }
            TargetEvent::Stop => info!("I2C stop"),
        }
    }
}
