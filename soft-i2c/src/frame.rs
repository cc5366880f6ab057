//! Sniffer output frames
//!
//! Every observed byte becomes one 32-bit word:
//!
//! ```text
//!  31      24 23 22     16 15  12 11   9   8   7        0
//! +----------+--+---------+------+------+---+----------+
//! |   0xF0   |0 | address | state| ack  |ack| data     |
//! |          |  |         |      | phase|ed |          |
//! +----------+--+---------+------+------+---+----------+
//! ```
//!
//! On the wire the word is sent least significant byte first, so the tag is
//! the last of the four bytes.

use core::fmt;

use crate::state::{AckPhase, ProtocolState};

/// Marks the most significant byte of every frame word.
pub const FRAME_TAG: u8 = 0xF0;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Frame {
    /// 7-bit address of the transaction the byte belongs to.
    pub address: u8,
    pub state: ProtocolState,
    /// Acknowledge phase when the byte completed.
    pub ack: AckPhase,
    /// Level of the acknowledge bit that followed the byte, inverted: `true`
    /// means SDA was held low.
    pub acknowledged: bool,
    pub data: u8,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FrameError {
    BadTag(u8),
    BadState(u8),
    BadAck(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadTag(tag) => write!(f, "frame tag {tag:#04x} is not {FRAME_TAG:#04x}"),
            Self::BadState(code) => write!(f, "unknown protocol state code {code}"),
            Self::BadAck(code) => write!(f, "unknown acknowledge phase code {code}"),
        }
    }
}

impl core::error::Error for FrameError {}

impl Frame {
    pub const fn to_word(&self) -> u32 {
        (FRAME_TAG as u32) << 24
            | ((self.address & 0x7f) as u32) << 16
            | (self.state.code() as u32) << 12
            | (self.ack.code() as u32) << 9
            | (self.acknowledged as u32) << 8
            | self.data as u32
    }

    pub fn from_word(word: u32) -> Result<Self, FrameError> {
        let tag = (word >> 24) as u8;
        if tag != FRAME_TAG {
            return Err(FrameError::BadTag(tag));
        }

        let state_code = (word >> 12 & 0xf) as u8;
        let ack_code = (word >> 9 & 0x7) as u8;

        Ok(Self {
            address: (word >> 16 & 0x7f) as u8,
            state: ProtocolState::from_code(state_code).ok_or(FrameError::BadState(state_code))?,
            ack: AckPhase::from_code(ack_code).ok_or(FrameError::BadAck(ack_code))?,
            acknowledged: word >> 8 & 1 == 1,
            data: word as u8,
        })
    }

    pub const fn to_le_bytes(&self) -> [u8; 4] {
        self.to_word().to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 4]) -> Result<Self, FrameError> {
        Self::from_word(u32::from_le_bytes(bytes))
    }
}

/// Where the sniffer puts its frames.
///
/// Called from interrupt context. Implementations must not block; if there is
/// no room, dropping the frame is the expected behaviour.
pub trait FrameSink {
    fn emit(&mut self, frame: Frame);
}

impl<F> FrameSink for F
where
    F: FnMut(Frame),
{
    fn emit(&mut self, frame: Frame) {
        self(frame)
    }
}

/// Reassembles frames from a byte stream that may start mid-frame or lose
/// bytes.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: [u8; 4],
    len: usize,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            buffer: [0; 4],
            len: 0,
        }
    }

    /// Feeds one byte, returning a frame once four bytes ending in the tag
    /// have been collected.
    ///
    /// Malformed words whose tag is in place are reported and consumed. When
    /// the fourth byte is not the tag the oldest byte is dropped and decoding
    /// continues one byte later.
    pub fn push(&mut self, byte: u8) -> Option<Result<Frame, FrameError>> {
        if self.len == self.buffer.len() {
            self.buffer.copy_within(1.., 0);
            self.len -= 1;
        }
        self.buffer[self.len] = byte;
        self.len += 1;

        if self.len < self.buffer.len() || byte != FRAME_TAG {
            return None;
        }

        self.len = 0;
        Some(Frame::from_le_bytes(self.buffer))
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.len
    }
}
