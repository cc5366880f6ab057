use std::cell::RefCell;
use std::rc::Rc;

use simulator::{PINS, SCL, SDA, SimBus, SimLines, channel_sink, simulator};
use soft_i2c::{
    AckPhase, DEFAULT_FREQUENCY, Edge, EdgeHandler, ErrorKind, Frame, MAX_ATTEMPTS,
    NoAcknowledgeSource, ProtocolState, Sniffer, SyncI2cController, Target, TargetConfig,
    TargetEvent,
};

const A7: u8 = 0x42;

type Events = Rc<RefCell<Vec<(TargetEvent, usize, u8)>>>;

fn target(
    bus: &SimBus,
    respond: u8,
) -> (
    Target<SimLines, impl FnMut(&mut u8, usize, TargetEvent) + 'static>,
    Events,
) {
    let _ = env_logger::try_init();

    let events = Events::default();
    let log = events.clone();
    let handler = move |data: &mut u8, index: usize, event: TargetEvent| {
        if event == TargetEvent::Request {
            *data = respond;
        }
        log.borrow_mut().push((event, index, *data));
    };

    let config = TargetConfig::new(PINS, A7);
    let target = Target::new(bus.lines(PINS), &config, handler).unwrap();
    (target, events)
}

fn count(events: &Events, kind: TargetEvent) -> usize {
    events.borrow().iter().filter(|(e, ..)| *e == kind).count()
}

#[test]
fn write_one_byte() {
    let (bus, mut c) = simulator(DEFAULT_FREQUENCY).unwrap();
    let (mut t, events) = target(&bus, 0);
    bus.set_irq_callback(move |pin, edge| {
        t.on_pin_edge(pin, edge);
    });

    c.write(A7, &[0x2a]).unwrap();

    assert_eq!(
        *events.borrow(),
        [
            (TargetEvent::Start, 0, 0),
            (TargetEvent::Receive, 1, 0x2a),
            (TargetEvent::Stop, 0, 0),
        ]
    );
    assert_eq!(c.state(), ProtocolState::Stopped);
    assert!(bus.level(PINS.sda));
    assert!(bus.level(PINS.scl));
}

#[test]
fn read_one_byte() {
    let (bus, mut c) = simulator(DEFAULT_FREQUENCY).unwrap();
    let (mut t, events) = target(&bus, 0x99);
    bus.set_irq_callback(move |pin, edge| {
        t.on_pin_edge(pin, edge);
    });

    let mut response = [0];
    c.read(A7, &mut response).unwrap();

    assert_eq!(response, [0x99]);
    assert_eq!(count(&events, TargetEvent::Request), 1);
    assert_eq!(count(&events, TargetEvent::Stop), 1);
}

#[test]
fn write_read() {
    let (bus, mut c) = simulator(DEFAULT_FREQUENCY).unwrap();
    let (mut t, events) = target(&bus, 0x5a);
    bus.set_irq_callback(move |pin, edge| {
        t.on_pin_edge(pin, edge);
    });

    let mut response = [0; 2];
    c.write_read(A7, &[7], &mut response).unwrap();

    assert_eq!(response, [0x5a, 0x5a]);
    assert_eq!(
        *events.borrow(),
        [
            (TargetEvent::Start, 0, 0),
            (TargetEvent::Receive, 1, 7),
            (TargetEvent::Start, 0, 0),
            (TargetEvent::Request, 1, 0x5a),
            (TargetEvent::Request, 2, 0x5a),
            (TargetEvent::Stop, 0, 0),
        ]
    );
}

#[test]
fn nobody_home() {
    let _ = env_logger::try_init();
    let (bus, mut c) = simulator(DEFAULT_FREQUENCY).unwrap();

    let frames = Rc::new(RefCell::new(Vec::new()));
    let log = frames.clone();
    let mut sniffer = Sniffer::new(PINS, move |frame: Frame| log.borrow_mut().push(frame));
    bus.set_irq_callback(move |pin, edge| {
        sniffer.on_pin_edge(pin, edge);
    });

    let result = c.write(A7, &[1, 2, 3]).unwrap_err();
    assert_eq!(
        result,
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    );

    // Three address attempts, none acknowledged, and no data sent
    let frames = frames.borrow();
    assert_eq!(frames.len(), 3);
    assert!(
        frames
            .iter()
            .all(|f| f.data == 0x84 && f.state == ProtocolState::AddressPhase && !f.acknowledged)
    );
    assert_eq!(c.state(), ProtocolState::Stopped);
}

#[test]
fn stuck_data_line() {
    let (bus, mut c) = simulator(DEFAULT_FREQUENCY).unwrap();
    let (mut t, events) = target(&bus, 0);
    bus.set_irq_callback(move |pin, edge| {
        t.on_pin_edge(pin, edge);
    });
    bus.force(SDA, Some(true));

    let result = c.write(A7, &[0x2a]).unwrap_err();
    assert_eq!(
        result,
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    );
    // Without a falling data edge the target never sees a start
    assert!(events.borrow().is_empty());

    // Each attempt is a start and nine clock pulses, three delay units
    // apiece, and the last one is followed by a stop
    let unit = 10;
    let attempt = (3 + 9 * 3) * unit;
    assert_eq!(
        bus.elapsed_us(),
        MAX_ATTEMPTS as u64 * attempt + 3 * unit
    );
    assert_eq!(c.state(), ProtocolState::Stopped);
}

#[test]
fn data_never_acknowledged() {
    let (bus, mut c) = simulator(DEFAULT_FREQUENCY).unwrap();
    let (mut t, events) = target(&bus, 0);

    let frames = Rc::new(RefCell::new(Vec::new()));
    let log = frames.clone();
    let mut sniffer = Sniffer::new(PINS, move |frame: Frame| log.borrow_mut().push(frame));

    // Hold SDA high from the end of the address acknowledge on
    let line = bus.clone();
    let mut held = false;
    bus.set_irq_callback(move |pin, edge| {
        t.on_pin_edge(pin, edge);
        sniffer.on_pin_edge(pin, edge);

        let addressed = t.state() == ProtocolState::Receiving
            && t.ack_phase() == AckPhase::None
            && t.bit_counter() == 0;
        if pin == SCL && edge == Edge::Falling && addressed && !held {
            held = true;
            line.force(SDA, Some(true));
        }
    });

    let result = c.write(A7, &[0x2a]).unwrap_err();
    assert_eq!(result, ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
    assert_eq!(c.state(), ProtocolState::Stopped);

    // Releases the callback and with it the bus handle it holds
    bus.set_irq_callback(|_, _| {});
    bus.force(SDA, None);

    let frames = frames.borrow();
    assert_eq!(frames.len(), 1 + MAX_ATTEMPTS);
    assert_eq!(frames[0].data, 0x84);
    assert!(frames[0].acknowledged);
    assert!(frames[1..].iter().all(|f| {
        f.state == ProtocolState::Transmitting && f.data == 0xff && !f.acknowledged
    }));

    assert_eq!(count(&events, TargetEvent::Receive), MAX_ATTEMPTS);
    assert_eq!(count(&events, TargetEvent::Stop), 0);
}

#[tokio::test]
async fn sniffer_reports_write() {
    let (bus, mut c) = simulator(DEFAULT_FREQUENCY).unwrap();
    let (mut t, _) = target(&bus, 0);
    let (sink, mut frames) = channel_sink(8);
    let mut sniffer = Sniffer::new(PINS, sink);
    bus.set_irq_callback(move |pin, edge| {
        t.on_pin_edge(pin, edge);
        sniffer.on_pin_edge(pin, edge);
    });

    c.write(A7, &[0x55]).unwrap();

    let address = frames.next().await.unwrap().unwrap();
    assert_eq!(address.state, ProtocolState::AddressPhase);
    assert_eq!(address.data, 0x84);
    assert!(address.acknowledged);

    let data = frames.next().await.unwrap().unwrap();
    assert_eq!(
        data,
        Frame {
            address: A7,
            state: ProtocolState::Transmitting,
            ack: AckPhase::AwaitingReceiveAck,
            acknowledged: true,
            data: 0x55,
        }
    );
    assert_eq!(data.to_word(), 0xF042_3555);
    assert_eq!(frames.try_next(), None);
}

#[tokio::test]
async fn sniffer_reports_read() {
    let (bus, mut c) = simulator(DEFAULT_FREQUENCY).unwrap();
    let (mut t, _) = target(&bus, 0x99);
    let (sink, mut frames) = channel_sink(8);
    let mut sniffer = Sniffer::new(PINS, sink);
    bus.set_irq_callback(move |pin, edge| {
        t.on_pin_edge(pin, edge);
        sniffer.on_pin_edge(pin, edge);
    });

    let mut response = [0; 2];
    c.read(A7, &mut response).unwrap();

    let address = frames.next().await.unwrap().unwrap();
    assert_eq!(address.data, 0x85);

    for _ in 0..2 {
        let data = frames.next().await.unwrap().unwrap();
        assert_eq!(data.state, ProtocolState::Receiving);
        assert_eq!(data.ack, AckPhase::AwaitingTransmitAck);
        assert_eq!(data.data, 0x99);
    }
}
