use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::geometry::FrameGeometry;
use crate::matcher::{KeyMatcher, MagicKey};

/// Configuration for the frame assembler.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Output geometry; fixes the expected payload size.
    pub geometry: FrameGeometry,
    /// Marker that opens a frame.
    pub start_key: MagicKey,
    /// Marker that closes a frame.
    pub end_key: MagicKey,
}

impl AssemblerConfig {
    /// Bytes the capture buffer may hold before a frame counts as oversized.
    ///
    /// The end marker is appended like payload before it is recognized, so
    /// the buffer needs room for it on top of the payload.
    pub fn capacity(&self) -> usize {
        self.geometry.raw_len() + self.end_key.len()
    }
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            geometry: FrameGeometry::default(),
            start_key: MagicKey::frame_start(),
            end_key: MagicKey::frame_end(),
        }
    }
}

/// Where the assembler is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Scanning for a start marker.
    Idle,
    /// Capturing payload bytes until an end marker.
    InFrame,
}

/// Why a frame (or marker) was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// More bytes arrived than the capture buffer can hold.
    Overflow,
    /// A new start marker arrived before the end marker.
    Restarted,
    /// An end marker arrived with no frame open.
    UnmatchedEnd,
}

/// A completed frame payload, owned independently of the assembler.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame number within this assembler, starting at 1.
    pub sequence: u64,
    /// Bytes strictly between the start and end markers.
    pub payload: Bytes,
    /// Time from start marker to end marker.
    pub elapsed: Duration,
}

impl RawFrame {
    /// Transfer rate in megabits per second (2^20 bits).
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.payload.len() as f64 * 8.0) / (1024.0 * 1024.0 * secs)
    }
}

/// Observable results of feeding bytes to the assembler.
#[derive(Debug, Clone)]
pub enum AssemblerEvent {
    /// Bytes seen outside a frame (device console output).
    Text(Bytes),
    /// A start marker opened frame `sequence`.
    FrameStarted { sequence: u64 },
    /// An end marker closed a frame.
    FrameCompleted(RawFrame),
    /// A frame or stray marker was dropped; `dropped` bytes were discarded.
    FrameDiscarded {
        reason: DiscardReason,
        dropped: usize,
    },
}

/// Running totals for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub bytes_seen: u64,
    pub frames_started: u64,
    pub frames_completed: u64,
    pub frames_discarded: u64,
    pub unmatched_ends: u64,
}

/// Recovers marker-delimited frames from an unaligned byte stream.
///
/// Bytes may arrive in chunks of any size; markers straddling two chunks are
/// still recognized. Both matchers see every byte regardless of state. While
/// a frame is open each byte is stored before markers are evaluated.
#[derive(Debug)]
pub struct FrameAssembler {
    config: AssemblerConfig,
    start: KeyMatcher,
    end: KeyMatcher,
    state: AssemblerState,
    buf: BytesMut,
    text: BytesMut,
    capacity: usize,
    started_at: Option<Instant>,
    sequence: u64,
    stats: AssemblerStats,
}

impl FrameAssembler {
    /// Create an assembler for the native QuadCam layout.
    pub fn new() -> Self {
        Self::with_config(AssemblerConfig::default())
    }

    /// Create an assembler with explicit configuration.
    pub fn with_config(config: AssemblerConfig) -> Self {
        let capacity = config.capacity();
        Self {
            start: KeyMatcher::new(config.start_key.clone()),
            end: KeyMatcher::new(config.end_key.clone()),
            state: AssemblerState::Idle,
            buf: BytesMut::with_capacity(capacity),
            text: BytesMut::new(),
            capacity,
            started_at: None,
            sequence: 0,
            stats: AssemblerStats::default(),
            config,
        }
    }

    /// Feed a chunk of stream bytes and collect the resulting events.
    ///
    /// Idle bytes that could be the beginning of a start marker are held
    /// back until the marker completes or breaks, so a marker split across
    /// chunks never leaks into [`AssemblerEvent::Text`].
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AssemblerEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            self.stats.bytes_seen += 1;

            if self.state == AssemblerState::InFrame {
                if self.buf.len() < self.capacity {
                    self.buf.put_u8(byte);
                } else {
                    self.discard(DiscardReason::Overflow, &mut events);
                }
            }

            if self.state == AssemblerState::Idle {
                self.text.put_u8(byte);
            }

            let started = self.start.feed(byte);
            let ended = self.end.feed(byte);

            if started {
                let marker = self.start.key().len().min(self.text.len());
                self.text.truncate(self.text.len() - marker);
                self.flush_text(self.text.len(), &mut events);
                if self.state == AssemblerState::InFrame {
                    self.discard(DiscardReason::Restarted, &mut events);
                }
                self.begin(&mut events);
                continue;
            }

            if ended {
                match self.state {
                    AssemblerState::InFrame => self.complete(&mut events),
                    AssemblerState::Idle => {
                        self.stats.unmatched_ends += 1;
                        debug!("end marker without start marker");
                        events.push(AssemblerEvent::FrameDiscarded {
                            reason: DiscardReason::UnmatchedEnd,
                            dropped: 0,
                        });
                    }
                }
            }
        }

        let held = self.start.cursor().min(self.text.len());
        self.flush_text(self.text.len() - held, &mut events);
        events
    }

    /// Drop any open frame and matcher progress and return to `Idle`.
    pub fn reset(&mut self) {
        self.start.reset();
        self.end.reset();
        self.buf.clear();
        self.text.clear();
        self.started_at = None;
        self.state = AssemblerState::Idle;
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Payload bytes captured for the open frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    fn flush_text(&mut self, len: usize, events: &mut Vec<AssemblerEvent>) {
        if len > 0 {
            events.push(AssemblerEvent::Text(self.text.split_to(len).freeze()));
        }
    }

    fn begin(&mut self, events: &mut Vec<AssemblerEvent>) {
        self.sequence += 1;
        self.stats.frames_started += 1;
        self.buf.clear();
        self.end.reset();
        self.started_at = Some(Instant::now());
        self.state = AssemblerState::InFrame;
        debug!(sequence = self.sequence, "frame start");
        events.push(AssemblerEvent::FrameStarted {
            sequence: self.sequence,
        });
    }

    fn complete(&mut self, events: &mut Vec<AssemblerEvent>) {
        let payload_len = self.buf.len().saturating_sub(self.end.key().len());
        self.buf.truncate(payload_len);
        let payload = self.buf.split().freeze();
        self.buf.reserve(self.capacity);

        let elapsed = self
            .started_at
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        self.state = AssemblerState::Idle;
        self.stats.frames_completed += 1;

        events.push(AssemblerEvent::FrameCompleted(RawFrame {
            sequence: self.sequence,
            payload,
            elapsed,
        }));
    }

    fn discard(&mut self, reason: DiscardReason, events: &mut Vec<AssemblerEvent>) {
        let dropped = self.buf.len();
        warn!(
            sequence = self.sequence,
            ?reason,
            dropped,
            "discarding partial frame"
        );
        self.buf.clear();
        self.started_at = None;
        self.state = AssemblerState::Idle;
        self.stats.frames_discarded += 1;
        events.push(AssemblerEvent::FrameDiscarded { reason, dropped });
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
