//! Encoder telemetry decoding and the telemetry reading flow
//!
//! The arm reports its six encoders on one line:
//!
//! ```text
//! E1:v1|E2:v2|E3:v3|E4:v4|E5:v5|E6:v6\n
//! ```
//!
//! E1..E4 belong to M1..M4, E5 to S2 and E6 to S3. S1 has no encoder.

use std::io::{self, BufRead};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::axis::Axis;
use crate::notify::{Notification, Notifier};
use crate::state::SharedAxisState;

/// Only lines starting with this marker are telemetry
pub const FRAME_MARKER: &str = "E1:";

pub const ENCODER_COUNT: usize = 6;

/// Axis fed by each encoder, in encoder order
pub const ENCODER_AXES: [Axis; ENCODER_COUNT] =
    [Axis::M1, Axis::M2, Axis::M3, Axis::M4, Axis::S2, Axis::S3];

/// One decoded telemetry line; encoders whose token was malformed are `None`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetryFrame {
    values: [Option<i32>; ENCODER_COUNT],
}

impl TelemetryFrame {
    /// Value of encoder `E<number>` (1-based)
    pub fn encoder(&self, number: usize) -> Option<i32> {
        number
            .checked_sub(1)
            .and_then(|i| self.values.get(i).copied().flatten())
    }

    pub fn values(&self) -> [Option<i32>; ENCODER_COUNT] {
        self.values
    }

    /// Decoded `(axis, position)` pairs
    pub fn positions(&self) -> impl Iterator<Item = (Axis, i32)> + '_ {
        ENCODER_AXES
            .iter()
            .zip(self.values.iter())
            .filter_map(|(&axis, value)| value.map(|v| (axis, v)))
    }

    /// Stores every decoded position, returns how many axes were updated
    pub fn apply(&self, state: &SharedAxisState) -> usize {
        let mut updated = 0;
        for (axis, position) in self.positions() {
            state.set_position(axis, position);
            updated += 1;
        }
        updated
    }
}

/// Decodes one line, `None` if it is not a telemetry line
pub fn decode_frame(line: &str) -> Option<TelemetryFrame> {
    let line = line.trim();
    if !line.starts_with(FRAME_MARKER) {
        return None;
    }

    let mut frame = TelemetryFrame::default();
    for token in line.split('|').take(ENCODER_COUNT) {
        if let Some((index, value)) = decode_token(token) {
            frame.values[index] = Some(value);
        }
    }
    Some(frame)
}

fn decode_token(token: &str) -> Option<(usize, i32)> {
    let mut parts = token.split(':');
    let (key, value) = match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(value), None) => (key.trim(), value.trim()),
        _ => return None,
    };

    let number: usize = key.strip_prefix('E')?.parse().ok()?;
    if !(1..=ENCODER_COUNT).contains(&number) {
        return None;
    }
    let value: i32 = value.parse().ok()?;
    Some((number - 1, value))
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Serial read failed: {0}")]
    Read(#[from] io::Error),
}

/// Blocking reader loop feeding positions into the shared axis state
pub struct TelemetryReader<R: BufRead> {
    reader: R,
    state: Arc<SharedAxisState>,
    notifier: Notifier,
    cancel: CancellationToken,
}

impl<R: BufRead> TelemetryReader<R> {
    pub fn new(
        reader: R,
        state: Arc<SharedAxisState>,
        notifier: Notifier,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            state,
            notifier,
            cancel,
        }
    }

    /// Reads until cancelled, end of stream, or a read failure
    ///
    /// The port's read timeout bounds each blocking read, so cancellation is
    /// observed within one timeout. A failure ends this flow only; the
    /// control flow keeps running.
    pub fn run(mut self) -> Result<(), TelemetryError> {
        info!("Telemetry reader started");
        let mut line = String::new();
        let mut frames: u64 = 0;

        while !self.cancel.is_cancelled() {
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    info!("Telemetry stream ended after {} frames", frames);
                    return Ok(());
                }
                Ok(_) => {
                    match decode_frame(&line) {
                        Some(frame) => {
                            let updated = frame.apply(&self.state);
                            frames += 1;
                            debug!("Telemetry frame {}: {} axes updated", frames, updated);
                            self.notifier.send(Notification::TelemetryUpdated(frame));
                        }
                        None => debug!("Ignoring serial line: {:?}", line.trim_end()),
                    }
                    line.clear();
                }
                // A timeout keeps any partial line for the next read
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    error!("Serial read error, stopping telemetry: {}", e);
                    self.notifier.error(format!("Serial read error: {}", e));
                    return Err(e.into());
                }
            }
        }

        info!("Telemetry reader stopped after {} frames", frames);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};
    use tokio::sync::mpsc;

    #[test]
    fn full_frame_updates_every_encoded_axis() {
        let state = SharedAxisState::new();
        let frame = decode_frame("E1:10|E2:20|E3:30|E4:40|E5:50|E6:60").unwrap();

        assert_eq!(frame.apply(&state), 6);
        assert_eq!(state.position(Axis::M1), 10);
        assert_eq!(state.position(Axis::M2), 20);
        assert_eq!(state.position(Axis::M3), 30);
        assert_eq!(state.position(Axis::M4), 40);
        assert_eq!(state.position(Axis::S2), 50);
        assert_eq!(state.position(Axis::S3), 60);
        assert_eq!(state.position(Axis::S1), 0);
    }

    #[test]
    fn malformed_token_is_dropped_alone() {
        let state = SharedAxisState::new();
        state.set_position(Axis::M2, -7);

        let frame = decode_frame("E1:10|Ex:bad|E3:30|E4:40|E5:50|E6:60\r\n").unwrap();
        assert_eq!(frame.encoder(2), None);
        assert_eq!(frame.apply(&state), 5);

        assert_eq!(state.position(Axis::M1), 10);
        assert_eq!(state.position(Axis::M2), -7);
        assert_eq!(state.position(Axis::S3), 60);
    }

    #[test]
    fn token_edge_cases() {
        let frame = decode_frame("E1:-12|E2:1:2|E3|E7:5|E4:abc|E5: 99 ").unwrap();
        assert_eq!(
            frame.values(),
            [Some(-12), None, None, None, Some(99), None]
        );
    }

    #[test]
    fn only_the_first_six_tokens_count() {
        let frame = decode_frame("E1:1|E2:2|E3:3|E4:4|E5:5|junk|E6:6").unwrap();
        assert_eq!(frame.encoder(6), None);
        assert_eq!(frame.encoder(5), Some(5));
    }

    #[test]
    fn lines_without_marker_are_not_telemetry() {
        assert!(decode_frame("Arduino ready").is_none());
        assert!(decode_frame("E2:10|E1:20").is_none());
        assert!(decode_frame("").is_none());
    }

    #[test]
    fn reader_applies_frames_until_end_of_stream() {
        let input = "boot\nE1:5|E2:6|E3:7|E4:8|E5:9|E6:10\nE1:11|E2:12\n";
        let state = Arc::new(SharedAxisState::new());
        let (tx, mut rx) = mpsc::channel(16);

        let reader = TelemetryReader::new(
            Cursor::new(input.as_bytes().to_vec()),
            state.clone(),
            Notifier::new(tx),
            CancellationToken::new(),
        );
        reader.run().unwrap();

        assert_eq!(state.position(Axis::M1), 11);
        assert_eq!(state.position(Axis::M2), 12);
        assert_eq!(state.position(Axis::S3), 10);

        let mut frames = 0;
        while let Ok(n) = rx.try_recv() {
            if matches!(n, Notification::TelemetryUpdated(_)) {
                frames += 1;
            }
        }
        assert_eq!(frames, 2);
    }

    /// Yields one chunk per read, with a timeout between chunks
    struct ChoppyPort {
        chunks: Vec<io::Result<Vec<u8>>>,
    }

    impl Read for ChoppyPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(e) => Err(e),
            }
        }
    }

    #[test]
    fn timeout_mid_line_keeps_partial_data() {
        let port = ChoppyPort {
            chunks: vec![
                Ok(b"E1:42|E2".to_vec()),
                Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
                Ok(b":43\n".to_vec()),
            ],
        };
        let state = Arc::new(SharedAxisState::new());
        TelemetryReader::new(
            BufReader::new(port),
            state.clone(),
            Notifier::disabled(),
            CancellationToken::new(),
        )
        .run()
        .unwrap();

        assert_eq!(state.position(Axis::M1), 42);
        assert_eq!(state.position(Axis::M2), 43);
    }

    #[test]
    fn read_failure_ends_the_flow() {
        let port = ChoppyPort {
            chunks: vec![Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))],
        };
        let result = TelemetryReader::new(
            BufReader::new(port),
            Arc::new(SharedAxisState::new()),
            Notifier::disabled(),
            CancellationToken::new(),
        )
        .run();
        assert!(matches!(result, Err(TelemetryError::Read(_))));
    }

    #[test]
    fn cancelled_reader_returns_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = TelemetryReader::new(
            Cursor::new(b"E1:1\n".to_vec()),
            Arc::new(SharedAxisState::new()),
            Notifier::disabled(),
            cancel,
        )
        .run();
        assert!(result.is_ok());
    }
}
