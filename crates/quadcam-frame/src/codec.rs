//! `tokio_util` codec adapter over [`FrameAssembler`].

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::assembler::{AssemblerConfig, AssemblerEvent, FrameAssembler};
use crate::error::FrameError;

/// Decodes assembler events from an async byte stream.
///
/// Wrap any `AsyncRead` in `FramedRead::new(reader, MarkerCodec::new())` to
/// get a stream of [`AssemblerEvent`]s.
#[derive(Debug, Default)]
pub struct MarkerCodec {
    assembler: FrameAssembler,
    pending: VecDeque<AssemblerEvent>,
}

impl MarkerCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AssemblerConfig) -> Self {
        Self {
            assembler: FrameAssembler::with_config(config),
            pending: VecDeque::new(),
        }
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }
}

impl Decoder for MarkerCodec {
    type Item = AssemblerEvent;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending.is_empty() && !src.is_empty() {
            let chunk = src.split();
            self.pending.extend(self.assembler.push(&chunk));
        }
        Ok(self.pending.pop_front())
    }
}
