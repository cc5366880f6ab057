//! Serial style transport for sniffer frames

use std::collections::VecDeque;

use log::{debug, warn};
use soft_i2c::{Frame, FrameDecoder, FrameError, FrameSink};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Create a bounded frame channel holding up to `capacity` frames
///
/// The [`ChannelSink`] side never blocks, so it can be handed to a
/// [`soft_i2c::Sniffer`] running inside the interrupt callback.
pub fn channel_sink(capacity: usize) -> (ChannelSink, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ChannelSink { tx, dropped: 0 },
        FrameReceiver {
            rx,
            decoder: FrameDecoder::new(),
            backlog: VecDeque::new(),
        },
    )
}

/// Writes every frame as its four little-endian bytes
pub struct ChannelSink {
    tx: mpsc::Sender<[u8; 4]>,
    dropped: usize,
}

impl ChannelSink {
    /// Frames lost because the channel was full or closed
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl FrameSink for ChannelSink {
    fn emit(&mut self, frame: Frame) {
        match self.tx.try_send(frame.to_le_bytes()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                warn!("frame channel full, {} frames dropped", self.dropped);
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
                debug!("frame receiver is gone");
            }
        }
    }
}

/// Reads the byte stream back into frames
pub struct FrameReceiver {
    rx: mpsc::Receiver<[u8; 4]>,
    decoder: FrameDecoder,
    backlog: VecDeque<u8>,
}

impl FrameReceiver {
    /// Wait for the next frame
    ///
    /// Returns `None` once the sink is dropped and everything sent was read.
    pub async fn next(&mut self) -> Option<Result<Frame, FrameError>> {
        loop {
            if let Some(frame) = self.decode_backlog() {
                return Some(frame);
            }
            let bytes = self.rx.recv().await?;
            self.backlog.extend(bytes);
        }
    }

    /// The next frame if one was already sent
    pub fn try_next(&mut self) -> Option<Result<Frame, FrameError>> {
        loop {
            if let Some(frame) = self.decode_backlog() {
                return Some(frame);
            }
            let bytes = self.rx.try_recv().ok()?;
            self.backlog.extend(bytes);
        }
    }

    fn decode_backlog(&mut self) -> Option<Result<Frame, FrameError>> {
        while let Some(byte) = self.backlog.pop_front() {
            if let Some(frame) = self.decoder.push(byte) {
                return Some(frame);
            }
        }
        None
    }
}
