//! Simulated modem line for bench testing without hardware.
//!
//! [`SimClock`] is a virtual monotonic clock whose `sleep` advances time
//! instantly, so timeout paths run deterministically. [`ScriptedTransport`]
//! delivers inbound bytes at scheduled virtual times and records everything
//! written to it.

use crate::clock::Clock;
use crate::error::Result;
use crate::transport::Transport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Virtual clock shared between a transport and the engine
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    nanos: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Default)]
struct Script {
    inbound: VecDeque<(Duration, Vec<u8>)>,
    replies: VecDeque<Vec<(Duration, Vec<u8>)>>,
    written: Vec<Vec<u8>>,
}

impl Script {
    fn schedule(&mut self, at: Duration, bytes: Vec<u8>) {
        let pos = self
            .inbound
            .iter()
            .position(|(t, _)| *t > at)
            .unwrap_or(self.inbound.len());
        self.inbound.insert(pos, (at, bytes));
    }
}

/// Transport that replays scripted modem output on a [`SimClock`].
///
/// Clones share the same script, so a test can keep a handle for
/// inspecting writes after moving the transport into an engine.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    clock: SimClock,
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new(clock: SimClock) -> Self {
        ScriptedTransport {
            clock,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        // A poisoned script only means another test thread panicked.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make bytes available immediately
    pub fn push_inbound(&mut self, bytes: Vec<u8>) {
        let now = self.clock.now();
        self.script().schedule(now, bytes);
    }

    /// Make bytes available `delay` after the current virtual time
    pub fn deliver_after(&mut self, delay: Duration, bytes: Vec<u8>) {
        let at = self.clock.now() + delay;
        self.script().schedule(at, bytes);
    }

    /// Schedule modem output relative to the next write on the line.
    /// Each call scripts the answer to one further write.
    pub fn reply_to_next_write(&mut self, frames: Vec<(Duration, Vec<u8>)>) {
        self.script().replies.push_back(frames);
    }

    /// Everything written so far, one entry per write
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.script().written.clone()
    }

    /// Inbound bytes not yet read
    pub fn pending_inbound(&self) -> usize {
        self.script().inbound.iter().map(|(_, b)| b.len()).sum()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let now = self.clock.now();
        let mut script = self.script();
        script.written.push(bytes.to_vec());
        if let Some(frames) = script.replies.pop_front() {
            for (delay, frame) in frames {
                script.schedule(now + delay, frame);
            }
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let now = self.clock.now();
        let mut script = self.script();
        let inbound = &mut script.inbound;
        let mut filled = 0;

        while filled < buf.len() {
            let Some((at, bytes)) = inbound.front_mut() else {
                break;
            };
            if *at > now {
                break;
            }
            let take = bytes.len().min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&bytes[..take]);
            filled += take;
            if take == bytes.len() {
                inbound.pop_front();
            } else {
                bytes.drain(..take);
            }
        }
        Ok(filled)
    }
}
