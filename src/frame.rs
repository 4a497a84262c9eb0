//! Line-terminated frame accumulation.
//!
//! Every NM3 command and report ends with `\r\n`. [`FrameReader`] polls a
//! [`Transport`] until a terminator arrives or a deadline passes. Scanning is
//! incremental: each poll only inspects bytes that arrived since the last
//! one, and bytes that follow a terminator are kept for the next read.

use crate::clock::Clock;
use crate::constants::*;
use crate::error::Result;
use crate::transport::Transport;
use std::time::Duration;

const CHUNK_LEN: usize = 64;

/// Result of a single bounded read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// Complete frame, terminator included
    Frame(Vec<u8>),
    /// No terminator within the frame size cap; bytes are handed back
    Overflow(Vec<u8>),
    /// Deadline passed; `discarded` partial bytes were dropped
    Timeout { discarded: usize },
}

/// Accumulates transport bytes into frames
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    scanned: usize,
    max_len: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl FrameReader {
    pub fn new(max_len: usize) -> Self {
        FrameReader {
            buffer: Vec::with_capacity(max_len),
            scanned: 0,
            max_len,
        }
    }

    /// Number of bytes held for the next frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    /// Append received bytes without reading from a transport
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Read one frame, giving up once `timeout` has elapsed on `clock`
    pub fn read_frame<T, C>(
        &mut self,
        transport: &mut T,
        clock: &C,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<FrameRead>
    where
        T: Transport + ?Sized,
        C: Clock + ?Sized,
    {
        let deadline = clock.now() + timeout;
        let mut chunk = [0u8; CHUNK_LEN];

        loop {
            if let Some(outcome) = self.take_frame() {
                return Ok(outcome);
            }

            let n = transport.read_available(&mut chunk)?;
            if n > 0 {
                self.buffer.extend_from_slice(&chunk[..n]);
                continue;
            }

            let now = clock.now();
            if now >= deadline {
                let discarded = self.buffer.len();
                self.clear();
                return Ok(FrameRead::Timeout { discarded });
            }
            clock.sleep(poll_interval.min(deadline - now));
        }
    }

    /// Split off a completed frame if the unscanned tail holds a terminator
    fn take_frame(&mut self) -> Option<FrameRead> {
        if let Some(end) = self.find_terminator() {
            let frame: Vec<u8> = self.buffer.drain(..=end).collect();
            self.scanned = 0;
            return Some(FrameRead::Frame(frame));
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_len {
            let raw = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            return Some(FrameRead::Overflow(raw));
        }
        None
    }

    /// Take every complete frame still buffered, in arrival order, and
    /// return them with the unterminated tail, which is no longer buffered.
    pub fn drain_frames(&mut self) -> (Vec<Vec<u8>>, Vec<u8>) {
        let mut frames = Vec::new();
        self.scanned = 0;
        while let Some(end) = self.find_terminator() {
            frames.push(self.buffer.drain(..=end).collect());
        }
        let tail = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        (frames, tail)
    }

    /// Index of the `\n` ending the first terminator past `scanned`
    fn find_terminator(&self) -> Option<usize> {
        let start = self.scanned.max(1);
        (start..self.buffer.len())
            .find(|&i| self.buffer[i - 1] == TERMINATOR[0] && self.buffer[i] == TERMINATOR[1])
    }
}

/// Strip a trailing `\r\n` if present
pub fn strip_terminator(frame: &[u8]) -> &[u8] {
    frame.strip_suffix(TERMINATOR.as_slice()).unwrap_or(frame)
}
