//! Audio frame buffer
//!
//! PCM arrives from the voice agent in chunks of arbitrary length. The
//! assembler accumulates them and hands out whole encoder frames only, in
//! arrival order. An odd trailing byte is carried into the next chunk so a
//! sample split across two chunks is reassembled rather than lost.

use std::collections::VecDeque;
use std::time::Duration;

/// Shape of one encoder frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration: Duration,
}

impl FrameSpec {
    pub fn new(sample_rate: u32, channels: u16, frame_duration: Duration) -> Self {
        Self {
            sample_rate,
            channels,
            frame_duration,
        }
    }

    /// Interleaved samples in one frame: duration x rate x channels
    pub fn samples_per_frame(&self) -> usize {
        let per_channel = self.sample_rate as u128 * self.frame_duration.as_micros() / 1_000_000;
        per_channel as usize * self.channels as usize
    }
}

/// FIFO accumulator of PCM samples
#[derive(Debug)]
pub struct FrameAssembler {
    frame_len: usize,
    samples: VecDeque<i16>,
    pending_byte: Option<u8>,
}

impl FrameAssembler {
    pub fn new(spec: FrameSpec) -> Self {
        let frame_len = spec.samples_per_frame().max(1);
        Self {
            frame_len,
            samples: VecDeque::with_capacity(frame_len * 2),
            pending_byte: None,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Samples buffered but not yet dispatched
    pub fn buffered(&self) -> usize {
        self.samples.len()
    }

    /// Append a chunk of little-endian 16-bit PCM
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        if let Some(low) = self.pending_byte.take() {
            match rest.split_first() {
                Some((high, tail)) => {
                    self.samples.push_back(i16::from_le_bytes([low, *high]));
                    rest = tail;
                }
                None => {
                    self.pending_byte = Some(low);
                    return;
                }
            }
        }

        let mut pairs = rest.chunks_exact(2);
        for pair in &mut pairs {
            self.samples.push_back(i16::from_le_bytes([pair[0], pair[1]]));
        }
        if let [odd] = pairs.remainder() {
            self.pending_byte = Some(*odd);
        }
    }

    pub fn push_samples(&mut self, samples: &[i16]) {
        self.samples.extend(samples.iter().copied());
    }

    /// Slice one whole frame off the front, if one is available
    pub fn next_frame(&mut self) -> Option<Vec<i16>> {
        if self.samples.len() < self.frame_len {
            return None;
        }
        Some(self.samples.drain(..self.frame_len).collect())
    }
}
