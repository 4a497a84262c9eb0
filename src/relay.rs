//! Surface relay node.
//!
//! The modem is owned by a single worker thread; async tasks reach it only
//! through a cloneable [`ModemHandle`], so no two tasks can ever drive the
//! half-duplex link at once and a blocking frame read never stalls the
//! cooperative scheduler.
//!
//! Around the worker run three cooperative tasks:
//!
//! - [`status_task`] reports while the companion link is down
//! - [`relay_task`] forwards companion-app requests to the modem
//! - [`blink_task`] drives a status indicator

use crate::clock::Clock;
use crate::constants::*;
use crate::error::{ModemError, Result};
use crate::mission::RelayRequest;
use crate::protocol::Nm3;
use crate::transport::Transport;
use crate::types::{ModemAddress, PingOutcome, VoltageReading};
use log::{info, warn};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

const REQUEST_QUEUE_LEN: usize = 8;

enum ModemRequest {
    Identity {
        reply: oneshot::Sender<Result<VoltageReading>>,
    },
    Ping {
        target: ModemAddress,
        reply: oneshot::Sender<Result<PingOutcome>>,
    },
    Unicast {
        request: RelayRequest,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
}

/// Async access to a modem owned by a worker thread
#[derive(Debug, Clone)]
pub struct ModemHandle {
    tx: mpsc::Sender<ModemRequest>,
}

impl std::fmt::Debug for ModemRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModemRequest::Identity { .. } => f.write_str("Identity"),
            ModemRequest::Ping { target, .. } => write!(f, "Ping({})", target),
            ModemRequest::Unicast { request, .. } => write!(f, "Unicast({})", request.target),
        }
    }
}

/// Move the modem onto its own thread.
///
/// The worker exits and hands the modem back once every handle is dropped.
pub fn spawn_modem_worker<T, C>(mut modem: Nm3<T, C>) -> (ModemHandle, thread::JoinHandle<Nm3<T, C>>)
where
    T: Transport + 'static,
    C: Clock + 'static,
{
    let (tx, mut rx) = mpsc::channel(REQUEST_QUEUE_LEN);
    let worker = thread::spawn(move || {
        while let Some(request) = rx.blocking_recv() {
            // A dropped receiver means the caller gave up waiting.
            match request {
                ModemRequest::Identity { reply } => {
                    let _ = reply.send(modem.query_identity());
                }
                ModemRequest::Ping { target, reply } => {
                    let _ = reply.send(modem.ping(target));
                }
                ModemRequest::Unicast { request, reply } => {
                    let _ = reply.send(modem.send_unicast(request.target, &request.payload));
                }
            }
        }
        modem
    });
    (ModemHandle { tx }, worker)
}

impl ModemHandle {
    async fn call<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<R>>) -> ModemRequest,
    ) -> Result<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| ModemError::WorkerStopped)?;
        reply_rx.await.map_err(|_| ModemError::WorkerStopped)?
    }

    pub async fn query_identity(&self) -> Result<VoltageReading> {
        self.call(|reply| ModemRequest::Identity { reply }).await
    }

    pub async fn ping(&self, target: ModemAddress) -> Result<PingOutcome> {
        self.call(|reply| ModemRequest::Ping { target, reply }).await
    }

    pub async fn send_unicast(&self, request: RelayRequest) -> Result<Vec<u8>> {
        self.call(|reply| ModemRequest::Unicast { request, reply }).await
    }
}

/// Status light on the relay node
pub trait Indicator: Send {
    fn set(&mut self, on: bool);
}

/// Counts of messages handled by [`relay_task`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub forwarded: usize,
    pub failed: usize,
}

/// Log a status line every second while the companion link is down.
/// Returns once the link state sender is dropped.
pub async fn status_task(mut link: watch::Receiver<bool>) {
    loop {
        if *link.borrow_and_update() {
            if link.changed().await.is_err() {
                return;
            }
            continue;
        }
        info!("Not connected");
        tokio::select! {
            changed = link.changed() => if changed.is_err() { return; },
            _ = tokio::time::sleep(Duration::from_millis(STATUS_INTERVAL_MS)) => {}
        }
    }
}

/// Forward every companion-app request to the modem until the request
/// channel closes, pausing `pause` after each one
pub async fn relay_task(
    mut requests: mpsc::Receiver<RelayRequest>,
    modem: ModemHandle,
    pause: Duration,
) -> RelaySummary {
    let mut summary = RelaySummary::default();
    while let Some(request) = requests.recv().await {
        let target = request.target;
        match modem.send_unicast(request).await {
            Ok(echo) => {
                info!("Relayed to {}: {}", target, echo.escape_ascii());
                summary.forwarded += 1;
            }
            Err(e) => {
                warn!("Relay to {} failed: {}", target, e);
                summary.failed += 1;
            }
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    summary
}

/// Toggle the indicator, quickly while disconnected and slowly once connected
pub async fn blink_task<I: Indicator>(mut indicator: I, link: watch::Receiver<bool>) {
    let mut on = true;
    loop {
        indicator.set(on);
        on = !on;
        let half_period = if *link.borrow() {
            BLINK_CONNECTED_MS
        } else {
            BLINK_DISCONNECTED_MS
        };
        tokio::time::sleep(Duration::from_millis(half_period)).await;
    }
}

/// Run the relay node until the companion link stops delivering requests
pub async fn run_relay_node<I: Indicator>(
    modem: ModemHandle,
    requests: mpsc::Receiver<RelayRequest>,
    link: watch::Receiver<bool>,
    indicator: I,
) -> RelaySummary {
    let relay = relay_task(requests, modem, Duration::from_millis(RELAY_PAUSE_MS));
    let status = status_task(link.clone());
    let blink = blink_task(indicator, link);
    tokio::pin!(relay, status, blink);

    let mut status_done = false;
    loop {
        tokio::select! {
            summary = &mut relay => return summary,
            _ = &mut status, if !status_done => status_done = true,
            _ = &mut blink => {}
        }
    }
}
