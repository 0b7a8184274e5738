//! Binary frame decoding for the vehicle protocol.
//!
//! Every frame carries its own length in the first byte. The length counts the
//! message id plus the payload, so a frame occupies `size + 1` bytes on the
//! wire. All multi-byte fields are little-endian.
//!
//! ```text
//! +--------+--------+------------------+
//! | Size   | Msg id | Payload          |
//! | (u8)   | (u8)   | (size - 1 bytes) |
//! +--------+--------+------------------+
//! ```
//!
//! # Error Handling
//!
//! A frame that is shorter than its declared size, or whose declared size is
//! too small for the layout of its message id, is rejected with
//! [`ParseError::TruncatedFrame`]. Missing fields are never filled with zeros.
//! Unknown inbound ids are not errors: they decode to
//! [`TelemetryEvent::Unknown`] so the caller can log and move on.

use byteorder::{ByteOrder, LittleEndian};

use super::{constants::*, messages::*};

/// Errors that can occur when decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Fewer bytes than the frame or its message layout requires
    #[error("truncated frame: need {needed} bytes, got {available}")]
    TruncatedFrame {
        /// Message id, when the buffer was long enough to carry one
        msg_id: Option<u8>,
        needed: usize,
        available: usize,
    },
    /// Message id that has no command layout
    #[error("invalid message type: 0x{0:02x}")]
    InvalidMessageType(u8),
    /// A field holds a value outside its enumeration
    #[error("invalid {field} in message 0x{msg_id:02x}")]
    InvalidField { msg_id: u8, field: &'static str },
}

/// Sequential little-endian reader over one frame payload.
struct PayloadReader<'a> {
    msg_id: u8,
    data: &'a [u8],
    cursor: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(msg_id: u8, data: &'a [u8]) -> Self {
        Self {
            msg_id,
            data,
            cursor: 0,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let bytes = self
            .data
            .get(self.cursor..self.cursor + len)
            .ok_or(ParseError::TruncatedFrame {
                msg_id: Some(self.msg_id),
                needed: FRAME_HEADER_LEN + self.cursor + len,
                available: FRAME_HEADER_LEN + self.data.len(),
            })?;
        self.cursor += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn read_bool(&mut self) -> Result<bool, ParseError> {
        Ok(self.read_u8()? != 0)
    }

    fn read_u16(&mut self) -> Result<u16, ParseError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn read_f32(&mut self) -> Result<f32, ParseError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.take(len).map(|_| ())
    }

    fn invalid(&self, field: &'static str) -> ParseError {
        ParseError::InvalidField {
            msg_id: self.msg_id,
            field,
        }
    }
}

/// Split a raw buffer into its message id and declared payload.
///
/// Bytes past the declared size are ignored.
fn split_frame(data: &[u8]) -> Result<(u8, &[u8]), ParseError> {
    if data.len() < FRAME_HEADER_LEN {
        return Err(ParseError::TruncatedFrame {
            msg_id: data.get(1).copied(),
            needed: FRAME_HEADER_LEN,
            available: data.len(),
        });
    }

    let msg_id = data[1];
    let declared = data[0] as usize + 1;
    if declared < FRAME_HEADER_LEN {
        return Err(ParseError::TruncatedFrame {
            msg_id: Some(msg_id),
            needed: FRAME_HEADER_LEN,
            available: declared,
        });
    }
    if data.len() < declared {
        return Err(ParseError::TruncatedFrame {
            msg_id: Some(msg_id),
            needed: declared,
            available: data.len(),
        });
    }

    Ok((msg_id, &data[FRAME_HEADER_LEN..declared]))
}

fn expect_payload(msg_id: u8, payload: &[u8], len: usize) -> Result<(), ParseError> {
    if payload.len() < len {
        return Err(ParseError::TruncatedFrame {
            msg_id: Some(msg_id),
            needed: FRAME_HEADER_LEN + len,
            available: FRAME_HEADER_LEN + payload.len(),
        });
    }
    Ok(())
}

/// Payload length of each inbound message kind, `None` for unknown ids.
fn event_payload_len(msg_id: u8) -> Option<usize> {
    match msg_id {
        MSG_V2C_PING_RESPONSE
        | MSG_V2C_VEHICLE_DELOCALIZED
        | MSG_V2C_CAR_MESSAGE_CYCLE_OVERTIME
        | MSG_V2C_CAR_COLLISION
        | MSG_V2C_CAR_ERROR => Some(0),
        MSG_V2C_VERSION_RESPONSE => Some(VERSION_RESPONSE_PAYLOAD_LEN),
        MSG_V2C_BATTERY_LEVEL_RESPONSE => Some(BATTERY_RESPONSE_PAYLOAD_LEN),
        MSG_V2C_LOCALIZATION_POSITION_UPDATE => Some(POSITION_UPDATE_PAYLOAD_LEN),
        MSG_V2C_LOCALIZATION_TRANSITION_UPDATE => Some(TRANSITION_UPDATE_PAYLOAD_LEN),
        MSG_V2C_OFFSET_FROM_ROAD_CENTER_UPDATE => Some(OFFSET_UPDATE_PAYLOAD_LEN),
        MSG_V2C_SPEED_UPDATE => Some(SPEED_UPDATE_PAYLOAD_LEN),
        MSG_V2C_STATUS_UPDATE => Some(STATUS_UPDATE_PAYLOAD_LEN),
        _ => None,
    }
}

/// Payload length of each outbound message kind, `None` for unknown ids.
fn command_payload_len(msg_id: u8) -> Option<usize> {
    match msg_id {
        MSG_C2V_DISCONNECT
        | MSG_C2V_PING_REQUEST
        | MSG_C2V_VERSION_REQUEST
        | MSG_C2V_BATTERY_LEVEL_REQUEST
        | MSG_C2V_CANCEL_LANE_CHANGE => Some(0),
        MSG_C2V_SET_SPEED => Some(SET_SPEED_PAYLOAD_LEN),
        MSG_C2V_CHANGE_LANE => Some(CHANGE_LANE_PAYLOAD_LEN),
        MSG_C2V_SET_OFFSET_FROM_ROAD_CENTER => Some(SET_OFFSET_PAYLOAD_LEN),
        MSG_C2V_SET_LIGHTS => Some(SET_LIGHTS_PAYLOAD_LEN),
        MSG_C2V_LIGHTS_PATTERN => Some(LIGHTS_PATTERN_PAYLOAD_LEN),
        MSG_C2V_SDK_MODE => Some(SDK_MODE_PAYLOAD_LEN),
        MSG_C2V_TURN => Some(TURN_PAYLOAD_LEN),
        MSG_C2V_SET_CONFIG_PARAMS => Some(CONFIG_PARAMS_PAYLOAD_LEN),
        _ => None,
    }
}

/// Decode one inbound (vehicle to controller) frame.
///
/// # Examples
///
/// ```rust
/// use trackrunner::vehicle::protocol::{TelemetryEvent, decode_event};
///
/// let frame = [0x03, 0x19, 0x68, 0x2e];
/// assert_eq!(
///     decode_event(&frame),
///     Ok(TelemetryEvent::VersionResponse { version: 0x2e68 })
/// );
/// ```
pub fn decode_event(data: &[u8]) -> Result<TelemetryEvent, ParseError> {
    let (msg_id, payload) = split_frame(data)?;

    if let Some(len) = event_payload_len(msg_id) {
        expect_payload(msg_id, payload, len)?;
    }

    let mut reader = PayloadReader::new(msg_id, payload);
    let event = match msg_id {
        MSG_V2C_PING_RESPONSE => TelemetryEvent::PingResponse,
        MSG_V2C_VERSION_RESPONSE => TelemetryEvent::VersionResponse {
            version: reader.read_u16()?,
        },
        MSG_V2C_BATTERY_LEVEL_RESPONSE => TelemetryEvent::BatteryResponse {
            level: reader.read_u16()?,
        },
        MSG_V2C_LOCALIZATION_POSITION_UPDATE => parse_position_update(&mut reader)?,
        MSG_V2C_LOCALIZATION_TRANSITION_UPDATE => {
            let road_piece_idx = reader.read_u8()?;
            let offset = reader.read_f32()?;
            let is_clockwise = reader.read_u8()? == CLOCKWISE_SENTINEL;
            TelemetryEvent::TransitionUpdate(TransitionUpdate {
                road_piece_idx,
                offset,
                is_clockwise,
            })
        }
        MSG_V2C_VEHICLE_DELOCALIZED => TelemetryEvent::Delocalized,
        MSG_V2C_OFFSET_FROM_ROAD_CENTER_UPDATE => TelemetryEvent::OffsetFromRoadCenterUpdate {
            offset: reader.read_f32()?,
        },
        MSG_V2C_SPEED_UPDATE => TelemetryEvent::SpeedUpdate {
            speed: reader.read_u16()?,
        },
        MSG_V2C_STATUS_UPDATE => {
            reader.skip(1)?;
            TelemetryEvent::StatusUpdate(StatusUpdate {
                on_charger: reader.read_bool()?,
                battery_low: reader.read_bool()?,
                battery_full: reader.read_bool()?,
            })
        }
        MSG_V2C_CAR_MESSAGE_CYCLE_OVERTIME => TelemetryEvent::CycleOvertime,
        MSG_V2C_CAR_COLLISION => TelemetryEvent::Collision,
        MSG_V2C_CAR_ERROR => TelemetryEvent::CarError,
        raw_id => TelemetryEvent::Unknown {
            raw_id,
            raw_bytes: data[..FRAME_HEADER_LEN + payload.len()].to_vec(),
        },
    };

    Ok(event)
}

/// Parse a position update (0x27).
///
/// Layout: `[marker:u8][piece:u8][offset:f32][speed:u16][direction:u8]`.
fn parse_position_update(reader: &mut PayloadReader<'_>) -> Result<TelemetryEvent, ParseError> {
    let position_marker = reader.read_u8()?;
    let raw_piece_id = reader.read_u8()?;
    let offset = reader.read_f32()?;
    let speed = reader.read_u16()?;
    let is_clockwise = reader.read_u8()? == CLOCKWISE_SENTINEL;

    Ok(TelemetryEvent::PositionUpdate(PositionUpdate {
        position_marker,
        raw_piece_id,
        offset,
        speed,
        is_clockwise,
    }))
}

/// Decode one outbound (controller to vehicle) frame.
///
/// Used by the simulator to understand what it is told, and handy for
/// inspecting captured traffic.
pub fn decode_command(data: &[u8]) -> Result<Command, ParseError> {
    let (msg_id, payload) = split_frame(data)?;
    let len = command_payload_len(msg_id).ok_or(ParseError::InvalidMessageType(msg_id))?;
    expect_payload(msg_id, payload, len)?;

    let mut reader = PayloadReader::new(msg_id, payload);
    let command = match msg_id {
        MSG_C2V_DISCONNECT => Command::Disconnect,
        MSG_C2V_PING_REQUEST => Command::Ping,
        MSG_C2V_VERSION_REQUEST => Command::GetVersion,
        MSG_C2V_BATTERY_LEVEL_REQUEST => Command::GetBatteryLevel,
        MSG_C2V_CANCEL_LANE_CHANGE => Command::CancelLaneChange,
        MSG_C2V_SET_SPEED => Command::SetSpeed {
            speed: reader.read_u16()?,
            accel: reader.read_u16()?,
        },
        MSG_C2V_CHANGE_LANE => Command::ChangeLane {
            h_speed: reader.read_u16()?,
            h_accel: reader.read_u16()?,
            offset: reader.read_f32()?,
        },
        MSG_C2V_SET_OFFSET_FROM_ROAD_CENTER => Command::SetOffsetFromRoadCenter {
            offset: reader.read_f32()?,
        },
        MSG_C2V_SET_LIGHTS => Command::SetLights {
            mask: reader.read_u8()?,
        },
        MSG_C2V_LIGHTS_PATTERN => parse_lights_pattern(&mut reader)?,
        MSG_C2V_SDK_MODE => Command::SetSdkMode {
            on: reader.read_bool()?,
            flags: reader.read_u8()?,
        },
        MSG_C2V_TURN => {
            let kind = TurnKind::from_u8(reader.read_u8()?).ok_or(reader.invalid("turn type"))?;
            let trigger =
                TurnTrigger::from_u8(reader.read_u8()?).ok_or(reader.invalid("turn trigger"))?;
            match (kind, trigger) {
                (TurnKind::UTurn, TurnTrigger::Immediate) => Command::Turn180,
                (kind, trigger) => Command::Turn { kind, trigger },
            }
        }
        MSG_C2V_SET_CONFIG_PARAMS => {
            let super_code_parse_mask = reader.read_u8()?;
            let track_material = TrackMaterial::from_u8(reader.read_u8()?)
                .ok_or(reader.invalid("track material"))?;
            Command::SetConfigParams {
                super_code_parse_mask,
                track_material,
            }
        }
        other => return Err(ParseError::InvalidMessageType(other)),
    };

    Ok(command)
}

/// Parse a lights pattern (0x33). Only the first channel slot is read.
fn parse_lights_pattern(reader: &mut PayloadReader<'_>) -> Result<Command, ParseError> {
    let channel_count = reader.read_u8()?;
    if channel_count == 0 || channel_count as usize > LIGHT_CHANNEL_COUNT_MAX {
        return Err(reader.invalid("channel count"));
    }

    let channel = LightChannel::from_u8(reader.read_u8()?).ok_or(reader.invalid("light channel"))?;
    let effect = LightEffect::from_u8(reader.read_u8()?).ok_or(reader.invalid("light effect"))?;
    let start = reader.read_u8()?;
    let end = reader.read_u8()?;
    let cycles_per_10_sec = reader.read_u8()?;

    Ok(Command::SetLightsPattern {
        channel,
        effect,
        start,
        end,
        cycles_per_min: u16::from(cycles_per_10_sec) * 6,
    })
}
