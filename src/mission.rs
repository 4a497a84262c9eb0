//! Release node mission loop.
//!
//! [`MissionCoordinator`] is driven by an outer scheduler, which calls
//! [`MissionCoordinator::poll`] repeatedly between power-phase transitions.
//! Each poll reads at most one frame and moves the actuator when a release
//! or lock message arrives.

use crate::clock::Clock;
use crate::config::MissionConfig;
use crate::constants::*;
use crate::error::Result;
use crate::protocol::Nm3;
use crate::transport::Transport;
use crate::types::{ModemAddress, Response};
use log::info;
use serde::{Deserialize, Serialize};

/// Mechanical release driven by the coordinator
pub trait Actuator {
    /// Move to `degrees`, already clamped to 0..=180
    fn move_to(&mut self, degrees: f32);
}

impl<A: Actuator + ?Sized> Actuator for &mut A {
    fn move_to(&mut self, degrees: f32) {
        (**self).move_to(degrees)
    }
}

/// Outgoing message handed over by the companion-app link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub target: ModemAddress,
    pub payload: Vec<u8>,
}

/// What a single poll did
#[derive(Debug, Clone, PartialEq)]
pub enum MissionEvent {
    /// Release token received; actuator moved to the release angle
    Released { angle: f32 },
    /// Other message received; actuator moved to the lock angle
    Locked { angle: f32 },
    /// Empty message, ignored
    EmptyMessage,
    /// Any other response, including timeouts
    Idle(Response),
}

pub struct MissionCoordinator<T: Transport, C: Clock, A: Actuator> {
    modem: Nm3<T, C>,
    actuator: A,
    config: MissionConfig,
}

impl<T: Transport, C: Clock, A: Actuator> MissionCoordinator<T, C, A> {
    pub fn new(modem: Nm3<T, C>, actuator: A, config: MissionConfig) -> Self {
        MissionCoordinator {
            modem,
            actuator,
            config,
        }
    }

    pub fn modem(&mut self) -> &mut Nm3<T, C> {
        &mut self.modem
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Read one response and act on it
    pub fn poll(&mut self) -> MissionEvent {
        match self.modem.read_next_response() {
            Response::UnicastMessage { payload } => self.dispatch(&payload),
            other => MissionEvent::Idle(other),
        }
    }

    fn dispatch(&mut self, payload: &[u8]) -> MissionEvent {
        let token = payload.trim_ascii();
        if token.is_empty() {
            return MissionEvent::EmptyMessage;
        }

        if token == RELEASE_TOKEN {
            let angle = clamp_angle(self.config.release_angle_deg);
            info!("Release command received, moving to {} deg", angle);
            self.actuator.move_to(angle);
            MissionEvent::Released { angle }
        } else {
            let angle = clamp_angle(self.config.lock_angle_deg);
            info!(
                "Message {:?} received, moving to {} deg",
                String::from_utf8_lossy(token),
                angle
            );
            self.actuator.move_to(angle);
            MissionEvent::Locked { angle }
        }
    }

    /// Forward a companion-app message over the acoustic link
    pub fn forward(&mut self, request: &RelayRequest) -> Result<Vec<u8>> {
        self.modem.send_unicast(request.target, &request.payload)
    }
}

/// Bound a position to the servo's travel
pub fn clamp_angle(degrees: f32) -> f32 {
    if degrees.is_nan() {
        return 0.0;
    }
    degrees.clamp(0.0, MAX_ANGLE)
}
