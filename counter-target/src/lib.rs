use log::info;
use soft_i2c::{EventHandler, SevenBitAddress, TargetEvent};

pub mod driver;

pub const TARGET_ADDR: SevenBitAddress = 0x42;

/// Remembers the last byte written to it and answers every read with that
/// byte plus one.
#[derive(Debug, Default)]
pub struct Counter {
    last: u8,
}

impl Counter {
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

impl EventHandler for Counter {
    fn on_event(&mut self, data: &mut u8, byte_index: usize, event: TargetEvent) {
        match event {
            TargetEvent::Start => {}
            TargetEvent::Receive => {
                info!("Received {:#04x} as byte {byte_index}", *data);
                self.last = *data;
            }
            TargetEvent::Request => {
                *data = self.last.wrapping_add(1);
                info!("Answering byte {byte_index} with {:#04x}", *data);
            }
            TargetEvent::Stop => info!("Transaction finished"),
        }
    }
}
