use crate::clock::{Clock, SystemClock};
use crate::codec::{decode_response, encode_command, parse_address};
use crate::config::ModemConfig;
use crate::constants::*;
use crate::crypto::{cipher_from_config, Decrypted, FrameCipher};
use crate::error::{ModemError, Result};
use crate::events::{EventSink, LogSink, ModemEvent};
use crate::frame::{strip_terminator, FrameRead, FrameReader};
use crate::transport::{SerialTransport, Transport};
use crate::types::*;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Where an exchange currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    Sent,
    AwaitingAck,
    AwaitingData,
}

/// One frame pulled off the line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Inbound {
    Frame(Vec<u8>),
    /// Overflowed or undecryptable; decodes as malformed
    Corrupt(Vec<u8>),
    Timeout,
}

/// First phase of a two-phase exchange
#[derive(Debug, Clone, PartialEq, Eq)]
enum Ack {
    Echoed,
    Mismatch(Vec<u8>),
    Missing,
}

/// Timing and conversion settings for the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub response_timeout: Duration,
    pub query_timeout: Duration,
    pub range_timeout: Duration,
    pub poll_interval: Duration,
    pub sound_speed_mps: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&ModemConfig::default())
    }
}

impl From<&ModemConfig> for EngineSettings {
    fn from(config: &ModemConfig) -> Self {
        EngineSettings {
            response_timeout: config.response_timeout(),
            query_timeout: config.query_timeout(),
            range_timeout: config.range_timeout(),
            poll_interval: config.poll_interval(),
            sound_speed_mps: config.sound_speed(),
        }
    }
}

/// Main NM3 protocol interface.
///
/// Owns the transport and the encryption context. Every operation takes
/// `&mut self` and runs to completion before returning, so at most one
/// command is ever outstanding on the half-duplex link.
pub struct Nm3<T: Transport = SerialTransport, C: Clock = SystemClock> {
    transport: T,
    clock: C,
    reader: FrameReader,
    /// Complete frames set aside when a command went out, for `read_next_response`
    backlog: VecDeque<Vec<u8>>,
    cipher: Option<Box<dyn FrameCipher>>,
    sink: Arc<dyn EventSink>,
    settings: EngineSettings,
    state: ExchangeState,
}

impl Nm3 {
    /// Open the configured serial port
    pub fn open(config: &ModemConfig) -> Result<Self> {
        config.validate()?;
        let transport = SerialTransport::open(&config.port, config.baud_rate)?;
        Self::with_config(transport, SystemClock::new(), config)
    }

    /// List available serial ports
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        SerialTransport::list_ports()
    }
}

impl<T: Transport, C: Clock> Nm3<T, C> {
    /// Create an engine without encryption
    pub fn new(transport: T, clock: C, settings: EngineSettings) -> Self {
        Nm3 {
            transport,
            clock,
            reader: FrameReader::default(),
            backlog: VecDeque::new(),
            cipher: None,
            sink: Arc::new(LogSink),
            settings,
            state: ExchangeState::Idle,
        }
    }

    /// Create an engine from configuration, including its cipher.
    ///
    /// A counter-mode nonce drawn for this session is reported as
    /// [`ModemEvent::SessionNonce`] and stays readable through [`Nm3::cipher_iv`].
    pub fn with_config(transport: T, clock: C, config: &ModemConfig) -> Result<Self> {
        let mut nm3 = Self::new(transport, clock, EngineSettings::from(config));
        if let Some(encryption) = &config.encryption {
            let cipher = cipher_from_config(encryption)?;
            if encryption.iv.is_none() {
                nm3.sink.record(&ModemEvent::SessionNonce {
                    nonce: cipher.iv().to_vec(),
                });
            }
            nm3.cipher = Some(cipher);
        }
        Ok(nm3)
    }

    pub fn with_cipher(mut self, cipher: Box<dyn FrameCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// IV or counter nonce in use, if encryption is enabled
    pub fn cipher_iv(&self) -> Option<[u8; BLOCK_SIZE]> {
        self.cipher.as_ref().map(|c| *c.iv())
    }

    /// Query own address and supply voltage
    pub fn query_identity(&mut self) -> Result<VoltageReading> {
        self.exchange(&Command::Query, |nm3| {
            let timeout = nm3.settings.query_timeout;
            match nm3.receive(timeout, ExchangeState::AwaitingData)? {
                Inbound::Timeout => Err(ModemError::NoResponse),
                Inbound::Corrupt(raw) => Err(ModemError::ProtocolError { raw }),
                Inbound::Frame(frame) => match decode_response(&frame) {
                    Response::AddressReport { address, voltage_raw } => {
                        Ok(VoltageReading { address, voltage_raw })
                    }
                    Response::Malformed { raw } => Err(ModemError::ProtocolError { raw }),
                    _ => Err(ModemError::UnexpectedResponse { raw: frame }),
                },
            }
        })
    }

    /// Query the supply voltage of a remote modem
    pub fn query_voltage(&mut self, target: ModemAddress) -> Result<VoltageReading> {
        let command = Command::VoltageQuery { target };
        self.exchange(&command, |nm3| {
            match nm3.await_ack(&command)? {
                Ack::Echoed => {}
                Ack::Mismatch(raw) => return Err(ModemError::UnexpectedResponse { raw }),
                Ack::Missing => return Err(ModemError::AckTimeout),
            }

            let timeout = nm3.settings.query_timeout;
            match nm3.receive(timeout, ExchangeState::AwaitingData)? {
                Inbound::Timeout => Err(ModemError::ResponseTimeout),
                Inbound::Corrupt(raw) => Err(ModemError::ProtocolError { raw }),
                Inbound::Frame(frame) => match decode_response(&frame) {
                    Response::VoltageReport { address, voltage_raw } if address == target => {
                        Ok(VoltageReading { address, voltage_raw })
                    }
                    Response::Malformed { raw } => Err(ModemError::ProtocolError { raw }),
                    _ => Err(ModemError::UnexpectedResponse { raw: frame }),
                },
            }
        })
    }

    /// Measure the range to a remote modem.
    ///
    /// A missing or mismatched acknowledgment is not an error: the exchange
    /// is abandoned and [`PingOutcome::NoAcknowledgment`] is returned. A
    /// `#TO` report from the modem yields [`PingOutcome::NoRange`].
    pub fn ping(&mut self, target: ModemAddress) -> Result<PingOutcome> {
        let command = Command::Ping { target };
        self.exchange(&command, |nm3| {
            if nm3.await_ack(&command)? != Ack::Echoed {
                nm3.sink.record(&ModemEvent::AckMissing {
                    command: format!("ping {}", target),
                });
                return Ok(PingOutcome::NoAcknowledgment);
            }

            let timeout = nm3.settings.range_timeout;
            match nm3.receive(timeout, ExchangeState::AwaitingData)? {
                Inbound::Timeout => Err(ModemError::ResponseTimeout),
                Inbound::Corrupt(raw) => Err(ModemError::UnexpectedResponse { raw }),
                Inbound::Frame(frame) => match decode_response(&frame) {
                    Response::RangeReport { travel_time_raw } => Ok(PingOutcome::Range {
                        travel_time_raw,
                        distance_m: distance_from_travel_time(
                            travel_time_raw,
                            nm3.settings.sound_speed_mps,
                        ),
                    }),
                    Response::Timeout => Ok(PingOutcome::NoRange),
                    _ => Err(ModemError::UnexpectedResponse { raw: frame }),
                },
            }
        })
    }

    /// Send a unicast message and return the modem's echo
    pub fn send_unicast(&mut self, target: ModemAddress, payload: &[u8]) -> Result<Vec<u8>> {
        self.send_message(&Command::Unicast {
            target,
            payload: payload.to_vec(),
        })
    }

    /// Send the release token to a remote modem
    pub fn release(&mut self, target: ModemAddress) -> Result<Vec<u8>> {
        self.send_message(&Command::Release { target })
    }

    /// Send the lock token to a remote modem
    pub fn lock(&mut self, target: ModemAddress) -> Result<Vec<u8>> {
        self.send_message(&Command::Lock { target })
    }

    fn send_message(&mut self, command: &Command) -> Result<Vec<u8>> {
        self.exchange(command, |nm3| {
            let timeout = nm3.settings.response_timeout;
            match nm3.receive(timeout, ExchangeState::AwaitingAck)? {
                Inbound::Frame(frame) => Ok(frame),
                Inbound::Corrupt(raw) => Err(ModemError::ProtocolError { raw }),
                Inbound::Timeout => Err(ModemError::NoResponse),
            }
        })
    }

    /// Read and decode whatever frame arrives next, without sending anything.
    ///
    /// Never fails: silence is [`Response::Timeout`] and anything that cannot
    /// be decoded is [`Response::Malformed`]. Transport faults are recorded
    /// and reported as a timeout. Frames that arrived behind an earlier
    /// reply are returned first, without touching the line.
    pub fn read_next_response(&mut self) -> Response {
        if self.state != ExchangeState::Idle {
            return Response::Timeout;
        }
        if let Some(frame) = self.backlog.pop_front() {
            let inbound = self.open_frame(&frame);
            return decode_inbound(inbound);
        }
        let timeout = self.settings.response_timeout;
        let inbound = self.receive(timeout, ExchangeState::AwaitingData);
        self.state = ExchangeState::Idle;

        match inbound {
            Ok(inbound) => decode_inbound(inbound),
            Err(e) => {
                self.sink.record(&ModemEvent::TransportFault {
                    message: e.to_string(),
                });
                Response::Timeout
            }
        }
    }

    /// Run one command exchange, returning to idle however it ends
    fn exchange<R>(
        &mut self,
        command: &Command,
        await_reply: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        if self.state != ExchangeState::Idle {
            return Err(ModemError::Busy);
        }
        let payload = encode_command(command)?;
        let result = self.transmit(&payload).and_then(|()| await_reply(self));
        self.state = ExchangeState::Idle;
        result
    }

    /// Frame, optionally encrypt, and write a command payload
    fn transmit(&mut self, payload: &[u8]) -> Result<()> {
        let mut wire = Vec::with_capacity(payload.len() + 2 * BLOCK_SIZE);
        match (&self.cipher, payload.split_first()) {
            (Some(cipher), Some((&COMMAND_DELIMITER, body))) => {
                wire.push(COMMAND_DELIMITER);
                wire.extend_from_slice(&cipher.encrypt(body));
            }
            _ => wire.extend_from_slice(payload),
        }
        wire.extend_from_slice(TERMINATOR);

        self.set_aside_buffered_input();
        self.transport.write(&wire)?;
        self.state = ExchangeState::Sent;
        self.sink.record(&ModemEvent::Transmitted { bytes: wire });
        Ok(())
    }

    /// Wait for one frame, strip its terminator and decrypt it
    fn receive(&mut self, timeout: Duration, waiting: ExchangeState) -> Result<Inbound> {
        self.state = waiting;
        let read = self.reader.read_frame(
            &mut self.transport,
            &self.clock,
            timeout,
            self.settings.poll_interval,
        )?;

        match read {
            FrameRead::Timeout { discarded } => {
                self.sink.record(&ModemEvent::ReadTimedOut {
                    waited: timeout,
                    discarded,
                });
                Ok(Inbound::Timeout)
            }
            FrameRead::Overflow(raw) => {
                self.sink.record(&ModemEvent::FrameOverflow { len: raw.len() });
                Ok(Inbound::Corrupt(raw))
            }
            FrameRead::Frame(frame) => Ok(self.open_frame(&frame)),
        }
    }

    /// Strip the terminator and decrypt everything after the delimiter
    fn open_frame(&self, frame: &[u8]) -> Inbound {
        let body = strip_terminator(frame);
        let inbound = match (&self.cipher, body.split_first()) {
            (Some(cipher), Some((&delimiter, ciphertext)))
                if delimiter == RESPONSE_DELIMITER || delimiter == COMMAND_DELIMITER =>
            {
                match cipher.decrypt(ciphertext) {
                    Decrypted::Plain(plain) => {
                        let mut out = Vec::with_capacity(plain.len() + 1);
                        out.push(delimiter);
                        out.extend_from_slice(&plain);
                        Inbound::Frame(out)
                    }
                    Decrypted::Malformed(_) => {
                        self.sink.record(&ModemEvent::DecryptDegraded {
                            len: ciphertext.len(),
                        });
                        Inbound::Corrupt(body.to_vec())
                    }
                }
            }
            _ => Inbound::Frame(body.to_vec()),
        };
        if let Inbound::Frame(bytes) = &inbound {
            self.sink.record(&ModemEvent::Received { bytes: bytes.clone() });
        }
        inbound
    }

    /// Move complete buffered frames to the backlog so they cannot be taken
    /// for the reply to the next command. An unterminated tail is dropped.
    fn set_aside_buffered_input(&mut self) {
        let (frames, tail) = self.reader.drain_frames();
        if !tail.is_empty() {
            self.sink.record(&ModemEvent::InputDropped { bytes: tail });
        }
        for frame in frames {
            if self.backlog.len() == MAX_BACKLOG_FRAMES {
                if let Some(oldest) = self.backlog.pop_front() {
                    self.sink.record(&ModemEvent::InputDropped { bytes: oldest });
                }
            }
            self.backlog.push_back(frame);
        }
    }

    /// Wait for the modem to echo `command`
    fn await_ack(&mut self, command: &Command) -> Result<Ack> {
        let timeout = self.settings.response_timeout;
        match self.receive(timeout, ExchangeState::AwaitingAck)? {
            Inbound::Timeout => Ok(Ack::Missing),
            Inbound::Corrupt(raw) => Ok(Ack::Mismatch(raw)),
            Inbound::Frame(frame) if is_echo_of(command, &frame) => Ok(Ack::Echoed),
            Inbound::Frame(frame) => Ok(Ack::Mismatch(frame)),
        }
    }
}

fn decode_inbound(inbound: Inbound) -> Response {
    match inbound {
        Inbound::Frame(frame) => decode_response(&frame),
        Inbound::Corrupt(raw) => Response::Malformed { raw },
        Inbound::Timeout => Response::Timeout,
    }
}

/// Whether `frame` echoes `command`: same prefix and, if digits follow, the same address
fn is_echo_of(command: &Command, frame: &[u8]) -> bool {
    let Some(rest) = frame.strip_prefix(command.prefix().as_slice()) else {
        return false;
    };
    let digits = rest.get(..3).unwrap_or(rest);
    match command.target() {
        Some(target) if !digits.is_empty() => parse_address(digits) == Some(target),
        _ => true,
    }
}
