//! Protocol and acknowledge state shared by all roles

use crate::SevenBitAddress;

/// What byte-level activity is in progress on the bus.
///
/// The discriminants are the 4-bit codes used in sniffer frames.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum ProtocolState {
    #[default]
    Idle = 0,
    /// A start condition was seen, no address bit clocked yet.
    Started = 1,
    /// Address and direction bits are being clocked.
    AddressPhase = 2,
    Transmitting = 3,
    Receiving = 4,
    /// A stop condition was issued. Only the controller reports this, the
    /// edge driven roles go straight back to [`ProtocolState::Idle`].
    Stopped = 5,
}

impl ProtocolState {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Idle,
            1 => Self::Started,
            2 => Self::AddressPhase,
            3 => Self::Transmitting,
            4 => Self::Receiving,
            5 => Self::Stopped,
            _ => return None,
        })
    }

    /// One-hot projection for status LEDs or a logic analyser.
    pub const fn led_mask(self) -> u8 {
        1 << self.code()
    }

    /// Whether a byte is being moved after the address was accepted.
    pub const fn is_data_phase(self) -> bool {
        matches!(self, Self::Transmitting | Self::Receiving)
    }
}

/// Whether the current clock cycle is an acknowledge cycle, and who drives it.
///
/// Orthogonal to [`ProtocolState`]: a `Transmitting` target first acknowledges
/// its address and later waits for the controller to acknowledge each byte.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum AckPhase {
    #[default]
    None = 0,
    /// We drive the acknowledge bit.
    AwaitingTransmitAck = 1,
    /// The other side drives the acknowledge bit.
    AwaitingReceiveAck = 2,
}

impl AckPhase {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::AwaitingTransmitAck,
            2 => Self::AwaitingReceiveAck,
            _ => return None,
        })
    }

    pub const fn led_mask(self) -> u8 {
        1 << self.code()
    }

    pub const fn is_armed(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// The two address bytes that select a device, one per direction.
///
/// Which byte counts as "receive" depends on whose point of view the engine
/// takes. A target transmits when the controller reads, while the sniffer
/// reports from the controller's side and calls that same byte a receive.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct AddressConditions {
    pub receive: u8,
    pub transmit: u8,
}

impl AddressConditions {
    /// Conditions as seen by a target answering at `address`.
    pub const fn target(address: SevenBitAddress) -> Self {
        let base = (address & 0x7f) << 1;
        Self {
            receive: base & !1,
            transmit: base | 1,
        }
    }

    /// Conditions as seen by the controller talking to `address`.
    pub const fn controller(address: SevenBitAddress) -> Self {
        let base = (address & 0x7f) << 1;
        Self {
            receive: base | 1,
            transmit: base & !1,
        }
    }

    /// The data-phase state selected by an observed address byte.
    pub const fn classify(&self, byte: u8) -> Option<ProtocolState> {
        if byte == self.transmit {
            Some(ProtocolState::Transmitting)
        } else if byte == self.receive {
            Some(ProtocolState::Receiving)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_conditions() {
        let conditions = AddressConditions::target(0x42);
        assert_eq!(conditions.receive, 0x84);
        assert_eq!(conditions.transmit, 0x85);
        assert_eq!(conditions.classify(0x84), Some(ProtocolState::Receiving));
        assert_eq!(conditions.classify(0x85), Some(ProtocolState::Transmitting));
        assert_eq!(conditions.classify(0x86), None);
    }

    #[test]
    fn controller_conditions_swap_direction() {
        let conditions = AddressConditions::controller(0x42);
        assert_eq!(conditions.receive, 0x85);
        assert_eq!(conditions.transmit, 0x84);
        assert_eq!(conditions.classify(0x85), Some(ProtocolState::Receiving));
        assert_eq!(conditions.classify(0x84), Some(ProtocolState::Transmitting));
    }

    #[test]
    fn conditions_differ_in_exactly_one_bit() {
        for address in 0..=0x7f {
            for conditions in [
                AddressConditions::target(address),
                AddressConditions::controller(address),
            ] {
                assert_ne!(conditions.receive, conditions.transmit);
                assert_eq!((conditions.receive ^ conditions.transmit).count_ones(), 1);
                assert_eq!(conditions.receive >> 1, address);
            }
        }
    }

    #[test]
    fn codes_round_trip_and_masks_are_one_hot() {
        for code in 0..8 {
            if let Some(state) = ProtocolState::from_code(code) {
                assert_eq!(state.code(), code);
                assert_eq!(state.led_mask().count_ones(), 1);
            }
            if let Some(ack) = AckPhase::from_code(code) {
                assert_eq!(ack.code(), code);
            }
        }
        assert_eq!(ProtocolState::from_code(6), None);
        assert_eq!(AckPhase::from_code(3), None);
        assert_eq!(ProtocolState::Receiving.led_mask(), 0b1_0000);
    }
}
