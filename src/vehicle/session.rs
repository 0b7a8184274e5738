//! Session management for a single vehicle.
//!
//! Tracks the connection lifecycle, owns the command surface and fans decoded
//! telemetry out to subscribers.
//!
//! ```text
//! Discovered -> ServicesResolved -> ChannelsResolved -> HandshakeSent -> Active
//!      \______________\___________________\_________________\__________\-> Disconnected
//! ```

use std::fmt;
use std::future::Future;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::protocol::{
    Command, LightChannel, LightEffect, SDK_OPTION_OVERRIDE_LOCALIZATION, TelemetryEvent,
    TrackMaterial, TurnKind, TurnTrigger, decode_event, encode_command,
};
use super::transport::Transport;
use crate::error::{Error, Result};

/// Lifecycle of a vehicle connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Discovered,
    ServicesResolved,
    ChannelsResolved,
    HandshakeSent,
    Active,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Discovered => "discovered",
            SessionState::ServicesResolved => "services resolved",
            SessionState::ChannelsResolved => "channels resolved",
            SessionState::HandshakeSent => "handshake sent",
            SessionState::Active => "active",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// What the vehicle has told us about itself so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleInfo {
    /// Model id from the advertisement, set by the transport
    pub model_id: Option<u8>,
    pub version: Option<u16>,
    pub battery_level: Option<u16>,
}

impl VehicleInfo {
    pub fn model_name(&self) -> Option<&'static str> {
        self.model_id.map(model_name)
    }
}

/// Name of a vehicle model, `"unknown"` for ids outside the known range.
pub fn model_name(model_id: u8) -> &'static str {
    match model_id {
        0x01 => "kourai",
        0x02 => "boson",
        0x03 => "rho",
        0x04 => "katal",
        0x05 => "hadion",
        0x06 => "spektrix",
        0x07 => "corax",
        0x08 => "groundshock",
        0x09 => "skull",
        0x0a => "thermo",
        0x0b => "nuke",
        0x0c => "guardian",
        0x0e => "bigbang",
        0x0f => "freewheel",
        0x10 => "x52",
        0x11 => "x52ice",
        0x12 => "mammoth",
        0x13 => "dynamo",
        0x14 => "ghost",
        _ => "unknown",
    }
}

/// Capabilities a vehicle connection hands to the components that drive it.
pub trait VehicleLink: Send + Sync {
    /// Encode and send a command. Fire and forget.
    fn send_command(&self, command: Command) -> impl Future<Output = Result<()>> + Send;

    /// Register a telemetry consumer with a bounded queue.
    ///
    /// Events arrive in transport order. The receiver yields `None` once the
    /// link is lost.
    fn subscribe(
        &self,
        capacity: usize,
    ) -> impl Future<Output = Result<mpsc::Receiver<TelemetryEvent>>> + Send;
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    consumers: Vec<mpsc::Sender<TelemetryEvent>>,
    info: VehicleInfo,
}

impl SessionInner {
    fn expect(&self, state: SessionState, event: &'static str) -> Result<()> {
        if self.state != state {
            return Err(Error::InvalidTransition {
                state: self.state,
                event,
            });
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        // Dropping the senders ends every subscriber's stream.
        self.consumers.clear();
    }
}

/// One vehicle connection on top of a [`Transport`].
pub struct Session<T> {
    transport: T,
    inner: Mutex<SessionInner>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            inner: Mutex::new(SessionInner {
                state: SessionState::Discovered,
                consumers: Vec::new(),
                info: VehicleInfo::default(),
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn info(&self) -> VehicleInfo {
        self.inner.lock().await.info
    }

    /// Record the model id the transport read from the advertisement.
    pub async fn set_model_id(&self, model_id: u8) {
        debug!("vehicle model {}", model_name(model_id));
        self.inner.lock().await.info.model_id = Some(model_id);
    }

    /// The transport found the vehicle's service.
    pub async fn on_service_ready(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.expect(SessionState::Discovered, "service ready")?;
        inner.state = SessionState::ServicesResolved;
        debug!("vehicle service resolved");
        Ok(())
    }

    /// The transport resolved the read and write channels; run the handshake.
    pub async fn on_channels_ready(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.expect(SessionState::ServicesResolved, "channels ready")?;
        inner.state = SessionState::ChannelsResolved;

        if let Err(e) = self.handshake(&mut inner) {
            warn!("handshake failed: {}", e);
            inner.disconnect();
            return Err(e);
        }
        Ok(())
    }

    fn handshake(&self, inner: &mut SessionInner) -> Result<()> {
        self.transport.enable_notifications()?;
        self.write(&Command::SetSdkMode {
            on: true,
            flags: SDK_OPTION_OVERRIDE_LOCALIZATION,
        })?;
        self.write(&Command::GetVersion)?;
        inner.state = SessionState::HandshakeSent;

        // The vehicle accepts commands before its version response arrives,
        // so there is nothing to wait for.
        inner.state = SessionState::Active;
        info!("session active");
        Ok(())
    }

    /// The transport dropped the link.
    pub async fn on_link_lost(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Disconnected {
            warn!("link lost while {}", inner.state);
        }
        inner.disconnect();
    }

    /// Decode one inbound frame and hand the event to every subscriber.
    ///
    /// Waits for queue space, so a slow subscriber slows the transport down
    /// instead of losing events.
    pub async fn on_frame(&self, frame: &[u8]) -> Result<TelemetryEvent> {
        let event = decode_event(frame).inspect_err(|e| {
            warn!(frame = %hex::encode(frame), "dropping frame: {}", e);
        })?;

        let consumers = {
            let mut inner = self.inner.lock().await;
            match &event {
                TelemetryEvent::VersionResponse { version } => {
                    info!("vehicle firmware 0x{:04x}", version);
                    inner.info.version = Some(*version);
                }
                TelemetryEvent::BatteryResponse { level } => {
                    debug!("battery level {}", level);
                    inner.info.battery_level = Some(*level);
                }
                TelemetryEvent::Delocalized => warn!("vehicle delocalized"),
                TelemetryEvent::Unknown { raw_id, raw_bytes } => {
                    debug!(frame = %hex::encode(raw_bytes), "unknown message 0x{:02x}", raw_id);
                }
                _ => {}
            }
            inner.consumers.clone()
        };

        let mut closed = false;
        for consumer in &consumers {
            if consumer.send(event.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            self.inner.lock().await.consumers.retain(|c| !c.is_closed());
        }

        Ok(event)
    }

    pub async fn subscribe(&self, capacity: usize) -> Result<mpsc::Receiver<TelemetryEvent>> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Active {
            return Err(Error::NotActive(inner.state));
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        inner.consumers.push(tx);
        Ok(rx)
    }

    pub async fn send_command(&self, command: Command) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Active {
            return Err(Error::NotActive(inner.state));
        }

        if let Err(e) = self.write(&command) {
            warn!("send failed, dropping session: {}", e);
            inner.disconnect();
            return Err(e);
        }

        if command == Command::Disconnect {
            info!("disconnect requested");
            inner.disconnect();
        }
        Ok(())
    }

    fn write(&self, command: &Command) -> Result<()> {
        let frame = encode_command(command);
        debug!(frame = %hex::encode(&frame), "sending {:?}", command);
        self.transport.send(frame)
    }

    pub async fn set_speed(&self, speed: u16, accel: u16) -> Result<()> {
        self.send_command(Command::SetSpeed { speed, accel }).await
    }

    pub async fn set_offset_from_road_center(&self, offset: f32) -> Result<()> {
        self.send_command(Command::SetOffsetFromRoadCenter { offset }).await
    }

    pub async fn change_lane(&self, h_speed: u16, h_accel: u16, offset: f32) -> Result<()> {
        self.send_command(Command::ChangeLane {
            h_speed,
            h_accel,
            offset,
        })
        .await
    }

    pub async fn cancel_lane_change(&self) -> Result<()> {
        self.send_command(Command::CancelLaneChange).await
    }

    pub async fn set_lights(&self, mask: u8) -> Result<()> {
        self.send_command(Command::SetLights { mask }).await
    }

    pub async fn set_lights_pattern(
        &self,
        channel: LightChannel,
        effect: LightEffect,
        start: u8,
        end: u8,
        cycles_per_min: u16,
    ) -> Result<()> {
        self.send_command(Command::SetLightsPattern {
            channel,
            effect,
            start,
            end,
            cycles_per_min,
        })
        .await
    }

    /// Set the RGB engine light, one pattern per colour channel.
    pub async fn set_engine_light(
        &self,
        r: u8,
        g: u8,
        b: u8,
        effect: LightEffect,
        cycles_per_min: u16,
    ) -> Result<()> {
        for (channel, level) in [
            (LightChannel::Red, r),
            (LightChannel::Green, g),
            (LightChannel::Blue, b),
        ] {
            let (start, end, cycles) = match effect {
                LightEffect::Throb | LightEffect::Flash => (0, level, cycles_per_min),
                LightEffect::Fade => (level, 0, cycles_per_min),
                LightEffect::Steady | LightEffect::Random => (level, level, 0),
            };
            self.set_lights_pattern(channel, effect, start, end, cycles).await?;
        }
        Ok(())
    }

    pub async fn set_sdk_mode(&self, on: bool, flags: u8) -> Result<()> {
        self.send_command(Command::SetSdkMode { on, flags }).await
    }

    pub async fn set_config_params(
        &self,
        super_code_parse_mask: u8,
        track_material: TrackMaterial,
    ) -> Result<()> {
        self.send_command(Command::SetConfigParams {
            super_code_parse_mask,
            track_material,
        })
        .await
    }

    /// Ask the vehicle to drop the link, then close the session.
    pub async fn disconnect(&self) -> Result<()> {
        self.send_command(Command::Disconnect).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.send_command(Command::Ping).await
    }

    pub async fn get_version(&self) -> Result<()> {
        self.send_command(Command::GetVersion).await
    }

    pub async fn get_battery_level(&self) -> Result<()> {
        self.send_command(Command::GetBatteryLevel).await
    }

    pub async fn turn(&self, kind: TurnKind, trigger: TurnTrigger) -> Result<()> {
        self.send_command(Command::Turn { kind, trigger }).await
    }

    pub async fn turn_180(&self) -> Result<()> {
        self.send_command(Command::Turn180).await
    }
}

impl<T: Transport> VehicleLink for Session<T> {
    async fn send_command(&self, command: Command) -> Result<()> {
        Session::send_command(self, command).await
    }

    async fn subscribe(&self, capacity: usize) -> Result<mpsc::Receiver<TelemetryEvent>> {
        Session::subscribe(self, capacity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_names() {
        assert_eq!(model_name(0x01), "kourai");
        assert_eq!(model_name(0x0e), "bigbang");
        assert_eq!(model_name(0x14), "ghost");
        assert_eq!(model_name(0x0d), "unknown");
        assert_eq!(model_name(0x00), "unknown");
        assert_eq!(model_name(0xff), "unknown");
    }
}
