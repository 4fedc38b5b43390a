//! Per-frame decoding and delivery to a sink.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use quadcam_frame::{collate, unpack16_to_unpack24, ChannelOrder, FrameGeometry, RawFrame};
use tracing::{error, info, warn};

use crate::error::SinkError;

/// A frame collated and converted to both pixel formats.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub sequence: u64,
    pub geometry: FrameGeometry,
    /// Collated, unpacked RGB565 (2 bytes per pixel, little-endian).
    pub rgb565: Vec<u8>,
    /// Flipped, unpacked RGB888 (3 bytes per pixel).
    pub rgb888: Vec<u8>,
    /// Time between the frame markers.
    pub elapsed: Duration,
    pub throughput_mbps: f64,
}

/// Receives decoded frames and console text from the reader.
///
/// Sinks run on the reader thread; ingestion waits until they return.
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: &DecodedFrame) -> Result<(), SinkError>;

    /// Device console bytes seen outside frames.
    fn on_text(&mut self, _text: &[u8]) {}
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn on_frame(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        (**self).on_frame(frame)
    }

    fn on_text(&mut self, text: &[u8]) {
        (**self).on_text(text)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn on_frame(&mut self, _frame: &DecodedFrame) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Collate and convert one raw frame.
pub fn decode_frame(
    raw: &RawFrame,
    geometry: FrameGeometry,
    order: ChannelOrder,
) -> quadcam_frame::Result<DecodedFrame> {
    let rgb565 = collate(&raw.payload, geometry)?;
    let rgb888 = unpack16_to_unpack24(&rgb565, geometry, order)?;
    Ok(DecodedFrame {
        sequence: raw.sequence,
        geometry,
        rgb565,
        rgb888,
        elapsed: raw.elapsed,
        throughput_mbps: raw.throughput_mbps(),
    })
}

/// Frame counters kept by [`FramePipeline`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    pub decoded: u64,
    pub rejected: u64,
    pub sink_failures: u64,
    /// Sink calls that panicked. Counted in `sink_failures` too.
    pub sink_panics: u64,
}

/// Decodes completed frames and hands them to a [`FrameSink`].
pub struct FramePipeline {
    geometry: FrameGeometry,
    order: ChannelOrder,
    sink: Box<dyn FrameSink>,
    counters: PipelineCounters,
}

impl FramePipeline {
    pub fn new(geometry: FrameGeometry, order: ChannelOrder, sink: Box<dyn FrameSink>) -> Self {
        Self {
            geometry,
            order,
            sink,
            counters: PipelineCounters::default(),
        }
    }

    /// Decode `raw` and deliver it. Failures are logged, never returned, so
    /// a bad frame cannot stop ingestion. A panicking sink is contained the
    /// same way.
    pub fn handle(&mut self, raw: &RawFrame) {
        info!(
            sequence = raw.sequence,
            bytes = raw.payload.len(),
            mbps = format_args!("{:.2}", raw.throughput_mbps()),
            "frame end"
        );

        let frame = match decode_frame(raw, self.geometry, self.order) {
            Ok(frame) => frame,
            Err(err) => {
                self.counters.rejected += 1;
                warn!(sequence = raw.sequence, error = %err, "dropping undecodable frame");
                return;
            }
        };
        self.counters.decoded += 1;

        let sink = &mut self.sink;
        match catch_unwind(AssertUnwindSafe(|| sink.on_frame(&frame))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.counters.sink_failures += 1;
                warn!(sequence = frame.sequence, error = %err, "frame sink failed");
            }
            Err(payload) => {
                self.counters.sink_failures += 1;
                self.counters.sink_panics += 1;
                error!(
                    sequence = frame.sequence,
                    panic = panic_message(payload.as_ref()),
                    "frame sink panicked"
                );
            }
        }
    }

    pub fn forward_text(&mut self, text: &[u8]) {
        let sink = &mut self.sink;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| sink.on_text(text))) {
            self.counters.sink_panics += 1;
            error!(panic = panic_message(payload.as_ref()), "text sink panicked");
        }
    }

    pub fn counters(&self) -> PipelineCounters {
        self.counters
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("geometry", &self.geometry)
            .field("order", &self.order)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;

    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<DecodedFrame>>>,
        text: Arc<Mutex<Vec<u8>>>,
        fail: bool,
    }

    impl FrameSink for Recorder {
        fn on_frame(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
            self.frames.lock().unwrap().push(frame.clone());
            if self.fail {
                return Err(SinkError::Notify(std::io::Error::other("no listener")));
            }
            Ok(())
        }

        fn on_text(&mut self, text: &[u8]) {
            self.text.lock().unwrap().extend_from_slice(text);
        }
    }

    fn raw(sequence: u64, payload: Vec<u8>) -> RawFrame {
        RawFrame {
            sequence,
            payload: Bytes::from(payload),
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn decoding_is_repeatable() {
        let geometry = FrameGeometry::new(4, 2).unwrap();
        let frame = raw(1, (0..geometry.raw_len() as u8).collect());

        let a = decode_frame(&frame, geometry, ChannelOrder::Rgb).unwrap();
        let b = decode_frame(&frame, geometry, ChannelOrder::Rgb).unwrap();

        assert_eq!(a.rgb565, b.rgb565);
        assert_eq!(a.rgb888, b.rgb888);
        assert_eq!(a.rgb565.len(), geometry.rgb565_len());
        assert_eq!(a.rgb888.len(), geometry.rgb888_len());
    }

    #[test]
    fn white_frame_decodes_to_shifted_white() {
        let geometry = FrameGeometry::new(8, 4).unwrap();
        let frame = raw(3, vec![0xFF; geometry.raw_len()]);

        let decoded = decode_frame(&frame, geometry, ChannelOrder::Bgr).unwrap();
        assert_eq!(decoded.sequence, 3);
        assert!(decoded
            .rgb888
            .chunks_exact(3)
            .all(|px| px == [0xF8, 0xFC, 0xF8]));
    }

    #[test]
    fn short_frame_is_counted_not_delivered() {
        let recorder = Recorder::default();
        let frames = Arc::clone(&recorder.frames);
        let geometry = FrameGeometry::new(4, 2).unwrap();
        let mut pipeline = FramePipeline::new(geometry, ChannelOrder::Rgb, Box::new(recorder));

        pipeline.handle(&raw(1, vec![0; 3]));

        assert!(frames.lock().unwrap().is_empty());
        assert_eq!(pipeline.counters().rejected, 1);
    }

    #[test]
    fn sink_failure_does_not_stop_pipeline() {
        let recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let frames = Arc::clone(&recorder.frames);
        let geometry = FrameGeometry::new(4, 2).unwrap();
        let mut pipeline = FramePipeline::new(geometry, ChannelOrder::Rgb, Box::new(recorder));

        pipeline.handle(&raw(1, vec![0; geometry.raw_len()]));
        pipeline.handle(&raw(2, vec![0; geometry.raw_len()]));

        assert_eq!(frames.lock().unwrap().len(), 2);
        assert_eq!(
            pipeline.counters(),
            PipelineCounters {
                decoded: 2,
                rejected: 0,
                sink_failures: 2,
                sink_panics: 0,
            }
        );
    }

    struct PanicsOnFirst {
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl FrameSink for PanicsOnFirst {
        fn on_frame(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
            if frame.sequence == 1 {
                panic!("renderer state corrupted");
            }
            self.seen.lock().unwrap().push(frame.sequence);
            Ok(())
        }

        fn on_text(&mut self, _text: &[u8]) {
            panic!("console closed");
        }
    }

    #[test]
    fn panicking_sink_is_contained() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let geometry = FrameGeometry::new(4, 2).unwrap();
        let mut pipeline = FramePipeline::new(
            geometry,
            ChannelOrder::Rgb,
            Box::new(PanicsOnFirst {
                seen: Arc::clone(&seen),
            }),
        );

        pipeline.handle(&raw(1, vec![0; geometry.raw_len()]));
        pipeline.forward_text(b"Ready\n");
        pipeline.handle(&raw(2, vec![0; geometry.raw_len()]));

        assert_eq!(seen.lock().unwrap().as_slice(), &[2]);
        let counters = pipeline.counters();
        assert_eq!(counters.decoded, 2);
        assert_eq!(counters.sink_failures, 1);
        assert_eq!(counters.sink_panics, 2);
    }

    #[test]
    fn text_is_forwarded() {
        let recorder = Recorder::default();
        let text = Arc::clone(&recorder.text);
        let mut pipeline =
            FramePipeline::new(FrameGeometry::QUADCAM, ChannelOrder::Rgb, Box::new(recorder));

        pipeline.forward_text(b"Ready\n");
        assert_eq!(text.lock().unwrap().as_slice(), b"Ready\n");
    }
}
