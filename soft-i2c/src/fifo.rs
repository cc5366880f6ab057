//! Eight bit shift register

/// Shift-in accumulator used to assemble and disassemble bytes one bit at a
/// time.
///
/// Bits enter at the low end and leave at the high end, so after eight calls
/// to [`Fifo8::shift_in`] the first bit shifted in is the most significant
/// bit. Shifting in zeroes while looking at the evicted bits walks a loaded
/// byte out MSB first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Fifo8 {
    data: u8,
}

impl Fifo8 {
    pub const fn new() -> Self {
        Self { data: 0 }
    }

    /// A register preloaded with `byte`, ready to be shifted out.
    pub const fn with(byte: u8) -> Self {
        Self { data: byte }
    }

    /// Push `bit` in at the low end and return the bit evicted from the top.
    pub fn shift_in(&mut self, bit: bool) -> bool {
        let out = self.data & 0x80 != 0;
        self.data = (self.data << 1) | u8::from(bit);
        out
    }

    pub fn reset(&mut self) {
        self.data = 0;
    }

    pub fn load(&mut self, byte: u8) {
        self.data = byte;
    }

    pub const fn data(&self) -> u8 {
        self.data
    }
}
