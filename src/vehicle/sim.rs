//! A simulated vehicle.
//!
//! Speaks the vehicle side of the wire protocol: it decodes command frames,
//! drives around a closed [`TrackLayout`] while its speed is non-zero and
//! reports one localization reading per tick.

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::protocol::{
    Command, PositionUpdate, TelemetryEvent, TransitionUpdate, TurnKind, decode_command,
    encode_event,
};
use super::transport::{ChannelTransport, read_frame};
use crate::config::SimConfig;
use crate::error::{Error, Result};

/// One physical piece: its hardware id and the markers read while crossing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPiece {
    pub piece_id: u8,
    pub markers: Vec<u8>,
}

impl SimPiece {
    pub fn new(piece_id: u8, markers: &[u8]) -> Self {
        Self {
            piece_id,
            markers: markers.to_vec(),
        }
    }
}

/// A closed loop of pieces in driving order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackLayout {
    pub pieces: Vec<SimPiece>,
    pub clockwise: bool,
}

impl TrackLayout {
    /// The starter oval: start/finish, a straight, two curve halves, a
    /// straight, two curve halves and the pre-finish line.
    pub fn oval() -> Self {
        Self {
            pieces: vec![
                SimPiece::new(33, &[4]),
                SimPiece::new(40, &[0, 1, 2]),
                SimPiece::new(17, &[0, 1]),
                SimPiece::new(18, &[2, 3]),
                SimPiece::new(39, &[0, 1, 2]),
                SimPiece::new(20, &[0, 1]),
                SimPiece::new(23, &[2, 3]),
                SimPiece::new(34, &[5]),
            ],
            clockwise: true,
        }
    }

    fn readings(&self) -> Vec<Reading> {
        self.pieces
            .iter()
            .enumerate()
            .flat_map(|(index, piece)| {
                piece.markers.iter().map(move |&marker| Reading {
                    index,
                    piece_id: piece.piece_id,
                    marker,
                })
            })
            .collect()
    }
}

impl Default for TrackLayout {
    fn default() -> Self {
        Self::oval()
    }
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    index: usize,
    piece_id: u8,
    marker: u8,
}

/// Vehicle state driven by commands and the tick clock.
#[derive(Debug)]
pub struct SimVehicle {
    config: SimConfig,
    clockwise: bool,
    readings: Vec<Reading>,
    cursor: usize,
    forward: bool,
    speed: u16,
    offset: f32,
}

impl SimVehicle {
    pub fn new(layout: TrackLayout, config: SimConfig) -> Self {
        let readings = layout.readings();
        let cursor = readings
            .iter()
            .position(|r| r.index == config.start_piece)
            .unwrap_or(0);

        Self {
            config,
            clockwise: layout.clockwise,
            readings,
            cursor,
            forward: true,
            speed: 0,
            offset: 0.0,
        }
    }

    /// Run until the vehicle is told to disconnect or either channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Vec<u8>>,
        telemetry: mpsc::Sender<Vec<u8>>,
    ) {
        let mut ticker = time::interval(self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let result = tokio::select! {
                frame = commands.recv() => {
                    let Some(frame) = frame else {
                        debug!("command channel closed");
                        break;
                    };
                    match decode_command(&frame) {
                        Ok(command) => self.handle(command, &telemetry).await,
                        Err(e) => {
                            warn!(frame = %hex::encode(&frame), "ignoring command: {}", e);
                            Ok(true)
                        }
                    }
                }
                _ = ticker.tick(), if self.speed > 0 => self.drive(&telemetry).await.map(|_| true),
            };

            match result {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    debug!("telemetry channel closed");
                    break;
                }
            }
        }
        info!("simulated vehicle stopped");
    }

    /// Apply one command. Returns `Ok(false)` when the vehicle should go away.
    async fn handle(
        &mut self,
        command: Command,
        telemetry: &mpsc::Sender<Vec<u8>>,
    ) -> Result<bool> {
        debug!("sim received {:?}", command);
        match command {
            Command::SetSpeed { speed, .. } => {
                self.speed = speed;
                emit(telemetry, TelemetryEvent::SpeedUpdate { speed }).await?;
            }
            Command::SetOffsetFromRoadCenter { offset } | Command::ChangeLane { offset, .. } => {
                self.offset = offset;
                emit(telemetry, TelemetryEvent::OffsetFromRoadCenterUpdate { offset }).await?;
            }
            Command::Ping => emit(telemetry, TelemetryEvent::PingResponse).await?,
            Command::GetVersion => {
                let version = self.config.firmware_version;
                emit(telemetry, TelemetryEvent::VersionResponse { version }).await?;
            }
            Command::GetBatteryLevel => {
                let level = self.config.battery_level;
                emit(telemetry, TelemetryEvent::BatteryResponse { level }).await?;
            }
            Command::Turn180
            | Command::Turn {
                kind: TurnKind::UTurn | TurnKind::UTurnJump,
                ..
            } => {
                self.forward = !self.forward;
            }
            Command::Disconnect => return Ok(false),
            Command::CancelLaneChange
            | Command::SetLights { .. }
            | Command::SetLightsPattern { .. }
            | Command::SetSdkMode { .. }
            | Command::Turn { .. }
            | Command::SetConfigParams { .. } => {}
        }
        Ok(true)
    }

    /// Move to the next reading and report it.
    async fn drive(&mut self, telemetry: &mpsc::Sender<Vec<u8>>) -> Result<()> {
        let Some(previous) = self.readings.get(self.cursor).copied() else {
            return emit(telemetry, TelemetryEvent::Delocalized).await;
        };

        let len = self.readings.len();
        self.cursor = if self.forward {
            (self.cursor + 1) % len
        } else {
            (self.cursor + len - 1) % len
        };
        let reading = self.readings[self.cursor];
        let is_clockwise = self.clockwise == self.forward;

        if reading.index != previous.index {
            emit(
                telemetry,
                TelemetryEvent::TransitionUpdate(TransitionUpdate {
                    road_piece_idx: reading.index as u8,
                    offset: self.offset,
                    is_clockwise,
                }),
            )
            .await?;
        }

        let update = TelemetryEvent::PositionUpdate(PositionUpdate {
            position_marker: reading.marker,
            raw_piece_id: reading.piece_id,
            offset: self.offset,
            speed: self.speed,
            is_clockwise,
        });
        trace!(piece = reading.piece_id, marker = reading.marker, "sim position");

        if self.config.repeat_readings {
            emit(telemetry, update.clone()).await?;
        }
        emit(telemetry, update).await
    }
}

async fn emit(telemetry: &mpsc::Sender<Vec<u8>>, event: TelemetryEvent) -> Result<()> {
    telemetry
        .send(encode_event(&event))
        .await
        .map_err(|_| Error::LinkClosed)
}

/// Start a simulated vehicle in this process.
///
/// Returns the transport a session sends through and the telemetry frames to
/// feed into [`pump_frames`](super::transport::pump_frames).
pub fn spawn(
    layout: TrackLayout,
    config: SimConfig,
    queue: usize,
) -> (ChannelTransport, mpsc::Receiver<Vec<u8>>) {
    let (transport, commands) = ChannelTransport::pair();
    let (telemetry_tx, telemetry_rx) = mpsc::channel(queue.max(1));
    let vehicle = SimVehicle::new(layout, config);
    tokio::spawn(vehicle.run(commands, telemetry_tx));
    (transport, telemetry_rx)
}

/// Serve one simulated vehicle per TCP connection.
pub async fn serve(addr: impl ToSocketAddrs, layout: TrackLayout, config: SimConfig) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, layout, config).await
}

/// Like [`serve`], on a listener the caller already bound.
pub async fn serve_on(listener: TcpListener, layout: TrackLayout, config: SimConfig) -> Result<()> {
    info!("simulator listening on {}", listener.local_addr()?);

    loop {
        let (client, addr) = listener.accept().await?;
        info!("new connection from {}", addr);
        let vehicle = SimVehicle::new(layout.clone(), config.clone());
        tokio::spawn(async move {
            if let Err(e) = handle_connection(client, vehicle).await {
                warn!("connection error: {}", e);
            }
            info!("connection from {} closed", addr);
        });
    }
}

async fn handle_connection(client: TcpStream, vehicle: SimVehicle) -> Result<()> {
    let (mut reader, mut writer) = client.into_split();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (telemetry_tx, mut telemetry_rx) = mpsc::channel::<Vec<u8>>(64);

    let inbound = async {
        while let Some(frame) = read_frame(&mut reader).await? {
            if commands_tx.send(frame).is_err() {
                break;
            }
        }
        Ok::<_, Error>(())
    };
    let outbound = async {
        while let Some(frame) = telemetry_rx.recv().await {
            writer.write_all(&frame).await?;
        }
        Ok::<_, Error>(())
    };

    tokio::select! {
        _ = vehicle.run(commands_rx, telemetry_tx) => Ok(()),
        result = inbound => result,
        result = outbound => result,
    }
}
