//! Observability hooks for the protocol engine.
//!
//! The engine reports line traffic and degradations to an injected
//! [`EventSink`] instead of printing. [`LogSink`] forwards to the `log`
//! facade; [`MemorySink`] keeps timestamped events for inspection.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// Something worth recording about a modem exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModemEvent {
    /// Frame written to the line, as sent
    Transmitted { bytes: Vec<u8> },
    /// Frame read from the line, after decryption
    Received { bytes: Vec<u8> },
    /// A read deadline elapsed
    ReadTimedOut { waited: Duration, discarded: usize },
    /// Too many bytes arrived without a terminator
    FrameOverflow { len: usize },
    /// Ciphertext was not a whole number of blocks and was passed on raw
    DecryptDegraded { len: usize },
    /// An acknowledgment was missing or did not echo the command
    AckMissing { command: String },
    /// Reading from the transport failed
    TransportFault { message: String },
    /// Buffered input discarded before a command went out
    InputDropped { bytes: Vec<u8> },
    /// Counter-mode nonce drawn for this session; peers need it as their `iv`
    SessionNonce { nonce: Vec<u8> },
}

/// Receives engine events
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ModemEvent);
}

/// Forwards events to the `log` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &ModemEvent) {
        match event {
            ModemEvent::Transmitted { bytes } => debug!("Sending:  {}", bytes.escape_ascii()),
            ModemEvent::Received { bytes } => debug!("Received: {}", bytes.escape_ascii()),
            ModemEvent::ReadTimedOut { waited, discarded } => {
                debug!("No frame after {:?} ({} partial bytes dropped)", waited, discarded)
            }
            ModemEvent::FrameOverflow { len } => {
                warn!("Discarding {} bytes received without terminator", len)
            }
            ModemEvent::DecryptDegraded { len } => {
                warn!("Ciphertext of {} bytes is not block aligned, passing it on undecrypted", len)
            }
            ModemEvent::AckMissing { command } => warn!("No acknowledgment for {}", command),
            ModemEvent::TransportFault { message } => warn!("Transport fault: {}", message),
            ModemEvent::InputDropped { bytes } => {
                warn!("Dropping stale input: {}", bytes.escape_ascii())
            }
            ModemEvent::SessionNonce { nonce } => {
                info!("Counter mode session nonce {}, set it as iv on every peer", hex::encode(nonce))
            }
        }
    }
}

/// Timestamped event
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub timestamp: DateTime<Utc>,
    pub event: ModemEvent,
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events without timestamps, in arrival order
    pub fn kinds(&self) -> Vec<ModemEvent> {
        self.events().into_iter().map(|r| r.event).collect()
    }

    pub fn contains(&self, predicate: impl Fn(&ModemEvent) -> bool) -> bool {
        self.events().iter().any(|r| predicate(&r.event))
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &ModemEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                timestamp: Utc::now(),
                event: event.clone(),
            });
        }
    }
}
