//! Binary frame encoding for the vehicle protocol.
//!
//! Layouts mirror `parsing`: a size byte, the message id, then the fields in
//! little-endian order. Reserved bytes are sent as zero.

use byteorder::{ByteOrder, LittleEndian};

use super::{constants::*, messages::*};

/// Fixed-length frame under construction.
///
/// The declared payload length is decided up front; `finish` zero-pads any
/// fields that were not written, which is how reserved bytes go out.
struct FrameBuilder {
    buf: Vec<u8>,
    len: usize,
}

impl FrameBuilder {
    fn new(msg_id: u8, payload_len: usize) -> Self {
        let len = FRAME_HEADER_LEN + payload_len;
        let mut buf = Vec::with_capacity(len);
        buf.push((payload_len + 1) as u8);
        buf.push(msg_id);
        Self { buf, len }
    }

    fn u8(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    fn u16(mut self, value: u16) -> Self {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        self
    }

    fn f32(mut self, value: f32) -> Self {
        let mut bytes = [0u8; 4];
        LittleEndian::write_f32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.buf.resize(self.len, 0);
        self.buf
    }
}

fn direction_byte(is_clockwise: bool) -> u8 {
    if is_clockwise { CLOCKWISE_SENTINEL } else { 0 }
}

/// The vehicle counts light cycles per ten seconds in a single byte.
fn cycles_per_10_sec(cycles_per_min: u16) -> u8 {
    u8::try_from(cycles_per_min / 6).unwrap_or(u8::MAX)
}

/// Encode a command into the exact bytes the vehicle expects.
pub fn encode_command(command: &Command) -> Vec<u8> {
    match *command {
        Command::SetSpeed { speed, accel } => {
            FrameBuilder::new(MSG_C2V_SET_SPEED, SET_SPEED_PAYLOAD_LEN)
                .u16(speed)
                .u16(accel)
                .finish()
        }
        Command::SetOffsetFromRoadCenter { offset } => {
            FrameBuilder::new(MSG_C2V_SET_OFFSET_FROM_ROAD_CENTER, SET_OFFSET_PAYLOAD_LEN)
                .f32(offset)
                .finish()
        }
        Command::ChangeLane {
            h_speed,
            h_accel,
            offset,
        } => FrameBuilder::new(MSG_C2V_CHANGE_LANE, CHANGE_LANE_PAYLOAD_LEN)
            .u16(h_speed)
            .u16(h_accel)
            .f32(offset)
            .finish(),
        Command::CancelLaneChange => FrameBuilder::new(MSG_C2V_CANCEL_LANE_CHANGE, 0).finish(),
        Command::SetLights { mask } => FrameBuilder::new(MSG_C2V_SET_LIGHTS, SET_LIGHTS_PAYLOAD_LEN)
            .u8(mask)
            .finish(),
        Command::SetLightsPattern {
            channel,
            effect,
            start,
            end,
            cycles_per_min,
        } => FrameBuilder::new(MSG_C2V_LIGHTS_PATTERN, LIGHTS_PATTERN_PAYLOAD_LEN)
            .u8(1)
            .u8(channel as u8)
            .u8(effect as u8)
            .u8(start.min(MAX_LIGHT_INTENSITY))
            .u8(end.min(MAX_LIGHT_INTENSITY))
            .u8(cycles_per_10_sec(cycles_per_min))
            .finish(),
        Command::SetSdkMode { on, flags } => {
            FrameBuilder::new(MSG_C2V_SDK_MODE, SDK_MODE_PAYLOAD_LEN)
                .u8(u8::from(on))
                .u8(flags)
                .finish()
        }
        Command::Disconnect => FrameBuilder::new(MSG_C2V_DISCONNECT, 0).finish(),
        Command::Ping => FrameBuilder::new(MSG_C2V_PING_REQUEST, 0).finish(),
        Command::GetVersion => FrameBuilder::new(MSG_C2V_VERSION_REQUEST, 0).finish(),
        Command::GetBatteryLevel => FrameBuilder::new(MSG_C2V_BATTERY_LEVEL_REQUEST, 0).finish(),
        Command::Turn180 => FrameBuilder::new(MSG_C2V_TURN, TURN_PAYLOAD_LEN)
            .u8(TurnKind::UTurn as u8)
            .u8(TurnTrigger::Immediate as u8)
            .finish(),
        Command::Turn { kind, trigger } => FrameBuilder::new(MSG_C2V_TURN, TURN_PAYLOAD_LEN)
            .u8(kind as u8)
            .u8(trigger as u8)
            .finish(),
        Command::SetConfigParams {
            super_code_parse_mask,
            track_material,
        } => FrameBuilder::new(MSG_C2V_SET_CONFIG_PARAMS, CONFIG_PARAMS_PAYLOAD_LEN)
            .u8(super_code_parse_mask)
            .u8(track_material as u8)
            .finish(),
    }
}

/// Encode a telemetry event the way a vehicle would send it.
pub fn encode_event(event: &TelemetryEvent) -> Vec<u8> {
    match event {
        TelemetryEvent::PingResponse => FrameBuilder::new(MSG_V2C_PING_RESPONSE, 0).finish(),
        TelemetryEvent::VersionResponse { version } => {
            FrameBuilder::new(MSG_V2C_VERSION_RESPONSE, VERSION_RESPONSE_PAYLOAD_LEN)
                .u16(*version)
                .finish()
        }
        TelemetryEvent::PositionUpdate(update) => {
            FrameBuilder::new(MSG_V2C_LOCALIZATION_POSITION_UPDATE, POSITION_UPDATE_PAYLOAD_LEN)
                .u8(update.position_marker)
                .u8(update.raw_piece_id)
                .f32(update.offset)
                .u16(update.speed)
                .u8(direction_byte(update.is_clockwise))
                .finish()
        }
        TelemetryEvent::TransitionUpdate(update) => {
            FrameBuilder::new(MSG_V2C_LOCALIZATION_TRANSITION_UPDATE, TRANSITION_UPDATE_PAYLOAD_LEN)
                .u8(update.road_piece_idx)
                .f32(update.offset)
                .u8(direction_byte(update.is_clockwise))
                .finish()
        }
        TelemetryEvent::Delocalized => FrameBuilder::new(MSG_V2C_VEHICLE_DELOCALIZED, 0).finish(),
        TelemetryEvent::BatteryResponse { level } => {
            FrameBuilder::new(MSG_V2C_BATTERY_LEVEL_RESPONSE, BATTERY_RESPONSE_PAYLOAD_LEN)
                .u16(*level)
                .finish()
        }
        TelemetryEvent::StatusUpdate(status) => {
            FrameBuilder::new(MSG_V2C_STATUS_UPDATE, STATUS_UPDATE_PAYLOAD_LEN)
                .u8(0)
                .u8(u8::from(status.on_charger))
                .u8(u8::from(status.battery_low))
                .u8(u8::from(status.battery_full))
                .finish()
        }
        TelemetryEvent::SpeedUpdate { speed } => {
            FrameBuilder::new(MSG_V2C_SPEED_UPDATE, SPEED_UPDATE_PAYLOAD_LEN)
                .u16(*speed)
                .finish()
        }
        TelemetryEvent::OffsetFromRoadCenterUpdate { offset } => {
            FrameBuilder::new(MSG_V2C_OFFSET_FROM_ROAD_CENTER_UPDATE, OFFSET_UPDATE_PAYLOAD_LEN)
                .f32(*offset)
                .finish()
        }
        TelemetryEvent::CycleOvertime => {
            FrameBuilder::new(MSG_V2C_CAR_MESSAGE_CYCLE_OVERTIME, 0).finish()
        }
        TelemetryEvent::Collision => FrameBuilder::new(MSG_V2C_CAR_COLLISION, 0).finish(),
        TelemetryEvent::CarError => FrameBuilder::new(MSG_V2C_CAR_ERROR, 0).finish(),
        TelemetryEvent::Unknown { raw_bytes, .. } => raw_bytes.clone(),
    }
}
