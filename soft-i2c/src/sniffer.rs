//! Passive bus observer

use log::{debug, trace};

use crate::dispatch::EdgeHandler;
use crate::fifo::Fifo8;
use crate::frame::{Frame, FrameSink};
use crate::lines::{BusLevels, Edge, Line, PinPair};
use crate::state::{AckPhase, AddressConditions, ProtocolState};

/// Decodes all traffic on a bus into [`Frame`]s without ever driving a line.
///
/// States are reported from the controller's point of view: a controller
/// read is `Receiving`, and the acknowledge the controller gives during a
/// read is `AwaitingTransmitAck`.
pub struct Sniffer<S> {
    pins: PinPair,
    sink: S,
    levels: BusLevels,
    fifo: Fifo8,
    state: ProtocolState,
    /// Data phase selected by the last address byte.
    predicted: ProtocolState,
    ack: AckPhase,
    bit_counter: usize,
    address: u8,
}

impl<S: FrameSink> Sniffer<S> {
    pub fn new(pins: PinPair, sink: S) -> Self {
        Self {
            pins,
            sink,
            levels: BusLevels::IDLE,
            fifo: Fifo8::new(),
            state: ProtocolState::Idle,
            predicted: ProtocolState::Idle,
            ack: AckPhase::None,
            bit_counter: 0,
            address: 0,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn on_sda_edge(&mut self, edge: Edge) {
        self.levels.observe(Line::Sda, edge);
        if !self.levels.scl {
            return;
        }

        // The clock pulse of a stop condition counts as one bit
        if self.bit_counter % 9 > 1 {
            debug!(
                "{:?} cut short after {} bits",
                self.state,
                self.bit_counter % 9
            );
        }

        match edge {
            Edge::Falling => self.reset(ProtocolState::Started),
            Edge::Rising => self.reset(ProtocolState::Idle),
        }
    }

    pub fn on_scl_edge(&mut self, edge: Edge) {
        self.levels.observe(Line::Scl, edge);
        if edge == Edge::Rising && self.state != ProtocolState::Idle {
            self.sample();
        }
    }

    pub fn reset(&mut self, state: ProtocolState) {
        self.state = state;
        self.predicted = ProtocolState::Idle;
        self.ack = AckPhase::None;
        self.bit_counter = 0;
        self.fifo.reset();
    }

    fn sample(&mut self) {
        let bit = self.levels.sda;
        let position = self.bit_counter % 9;

        if position < 8 {
            self.fifo.shift_in(bit);
            if self.state == ProtocolState::Started {
                self.state = ProtocolState::AddressPhase;
            }
        }

        if position == 7 {
            self.byte_complete();
        } else if position == 8 {
            self.emit(!bit);
        }

        self.bit_counter += 1;
    }

    fn byte_complete(&mut self) {
        let byte = self.fifo.data();
        if self.state == ProtocolState::AddressPhase {
            self.address = byte >> 1;
            self.predicted = AddressConditions::controller(self.address)
                .classify(byte)
                .unwrap_or(ProtocolState::Idle);
            trace!("address {:#04x}, then {:?}", self.address, self.predicted);
            self.ack = AckPhase::AwaitingReceiveAck;
        } else if self.state == ProtocolState::Receiving {
            self.ack = AckPhase::AwaitingTransmitAck;
        } else {
            self.ack = AckPhase::AwaitingReceiveAck;
        }
    }

    fn emit(&mut self, acknowledged: bool) {
        let frame = Frame {
            address: self.address,
            state: self.state,
            ack: self.ack,
            acknowledged,
            data: self.fifo.data(),
        };
        trace!("{frame:?}");
        self.sink.emit(frame);

        self.ack = AckPhase::None;
        self.fifo.reset();
        if self.state == ProtocolState::AddressPhase {
            self.state = self.predicted;
        }
    }
}

impl<S: FrameSink> EdgeHandler for Sniffer<S> {
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

#[cfg(test)]
mod tests {
    use super::*;

    type Frames = std::vec::Vec<Frame>;

    /// Replays the edges of a controller that owns the whole bus.
    struct Wire<'a> {
        sniffer: Sniffer<&'a mut dyn FnMut(Frame)>,
        sda: bool,
        scl: bool,
    }

    impl Wire<'_> {
        fn sda(&mut self, level: bool) {
            if self.sda != level {
                self.sda = level;
                let edge = if level { Edge::Rising } else { Edge::Falling };
                self.sniffer.on_sda_edge(edge);
            }
        }

        fn scl(&mut self, level: bool) {
            if self.scl != level {
                self.scl = level;
                let edge = if level { Edge::Rising } else { Edge::Falling };
                self.sniffer.on_scl_edge(edge);
            }
        }

        fn start(&mut self) {
            self.sda(true);
            self.scl(true);
            self.sda(false);
            self.scl(false);
        }

        fn stop(&mut self) {
            self.sda(false);
            self.scl(true);
            self.sda(true);
        }

        fn clock(&mut self, bit: bool) {
            self.sda(bit);
            self.scl(true);
            self.scl(false);
        }

        fn byte(&mut self, byte: u8, acknowledged: bool) {
            for i in (0..8).rev() {
                self.clock(byte >> i & 1 == 1);
            }
            self.clock(!acknowledged);
        }
    }

    fn observe(script: impl FnOnce(&mut Wire<'_>)) -> Frames {
        let mut frames = Frames::new();
        let mut push = |frame: Frame| frames.push(frame);
        let sink: &mut dyn FnMut(Frame) = &mut push;
        let mut wire = Wire {
            sniffer: Sniffer::new(PinPair::new(4, 5), sink),
            sda: true,
            scl: true,
        };
        script(&mut wire);
        drop(wire);
        frames
    }

    #[test]
    fn write_is_reported_per_byte() {
        let frames = observe(|w| {
            w.start();
            w.byte(0x84, true);
            w.byte(0x55, true);
            w.stop();
        });

        assert_eq!(
            frames,
            [
                Frame {
                    address: 0x42,
                    state: ProtocolState::AddressPhase,
                    ack: AckPhase::AwaitingReceiveAck,
                    acknowledged: true,
                    data: 0x84,
                },
                Frame {
                    address: 0x42,
                    state: ProtocolState::Transmitting,
                    ack: AckPhase::AwaitingReceiveAck,
                    acknowledged: true,
                    data: 0x55,
                },
            ]
        );
    }

    #[test]
    fn read_direction_comes_from_rw_bit() {
        let frames = observe(|w| {
            w.start();
            w.byte(0x85, true);
            w.byte(0x99, false);
            w.stop();
        });

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].state, ProtocolState::Receiving);
        assert_eq!(frames[1].ack, AckPhase::AwaitingTransmitAck);
        assert_eq!(frames[1].data, 0x99);
        assert!(!frames[1].acknowledged);
    }

    #[test]
    fn unacknowledged_address_is_still_reported() {
        let frames = observe(|w| {
            w.start();
            w.byte(0x22, false);
            w.stop();
        });

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].address, 0x11);
        assert!(!frames[0].acknowledged);
    }

    #[test]
    fn partial_byte_emits_nothing() {
        let frames = observe(|w| {
            w.start();
            for bit in [true, false, false, true] {
                w.clock(bit);
            }
            w.stop();
            // Clocking without a start is not traffic
            w.clock(true);
            w.byte(0x84, true);
        });

        assert!(frames.is_empty());
    }

    #[test]
    fn repeated_start_restarts_address_phase() {
        let frames = observe(|w| {
            w.start();
            w.byte(0x84, true);
            w.byte(0x01, true);
            w.start();
            w.byte(0x85, true);
            w.byte(0x02, false);
            w.stop();
        });

        let summary: Vec<_> = frames.iter().map(|f| (f.state, f.data)).collect();
        assert_eq!(
            summary,
            [
                (ProtocolState::AddressPhase, 0x84),
                (ProtocolState::Transmitting, 0x01),
                (ProtocolState::AddressPhase, 0x85),
                (ProtocolState::Receiving, 0x02),
            ]
        );
    }
}
