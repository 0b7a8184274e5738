//! Typed messages exchanged with a vehicle.
//!
//! [`Command`] covers everything the controller can send, [`TelemetryEvent`]
//! everything the vehicle reports back. Both are plain values; the byte
//! layouts live in the `encoding` and `parsing` modules.

/// LED channels addressable by a lights pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LightChannel {
    Red = 0,
    Tail = 1,
    Blue = 2,
    Green = 3,
    FrontLeft = 4,
    FrontRight = 5,
}

impl LightChannel {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LightChannel::Red),
            1 => Some(LightChannel::Tail),
            2 => Some(LightChannel::Blue),
            3 => Some(LightChannel::Green),
            4 => Some(LightChannel::FrontLeft),
            5 => Some(LightChannel::FrontRight),
            _ => None,
        }
    }
}

/// How a light channel moves between its `start` and `end` intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LightEffect {
    /// Hold the `start` intensity
    Steady = 0,
    /// Fade from `start` to `end`
    Fade = 1,
    /// Fade from `start` to `end` and back
    Throb = 2,
    /// On between `start` and `end`
    Flash = 3,
    /// Flicker, ignoring `start` and `end`
    Random = 4,
}

impl LightEffect {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LightEffect::Steady),
            1 => Some(LightEffect::Fade),
            2 => Some(LightEffect::Throb),
            3 => Some(LightEffect::Flash),
            4 => Some(LightEffect::Random),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TurnKind {
    None = 0,
    Left = 1,
    Right = 2,
    UTurn = 3,
    UTurnJump = 4,
}

impl TurnKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TurnKind::None),
            1 => Some(TurnKind::Left),
            2 => Some(TurnKind::Right),
            3 => Some(TurnKind::UTurn),
            4 => Some(TurnKind::UTurnJump),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TurnTrigger {
    /// Turn right away
    Immediate = 0,
    /// Turn at the next intersection piece
    Intersection = 1,
}

impl TurnTrigger {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TurnTrigger::Immediate),
            1 => Some(TurnTrigger::Intersection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TrackMaterial {
    Plastic = 0,
    Vinyl = 1,
}

impl TrackMaterial {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TrackMaterial::Plastic),
            1 => Some(TrackMaterial::Vinyl),
            _ => None,
        }
    }
}

/// Outgoing instruction for a vehicle.
///
/// Speeds are in mm/s, accelerations in mm/s², offsets in mm from the road
/// center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetSpeed { speed: u16, accel: u16 },
    SetOffsetFromRoadCenter { offset: f32 },
    ChangeLane { h_speed: u16, h_accel: u16, offset: f32 },
    CancelLaneChange,
    SetLights { mask: u8 },
    /// Intensities above [`MAX_LIGHT_INTENSITY`](super::MAX_LIGHT_INTENSITY)
    /// are clamped. The rate goes out as whole cycles per ten seconds in one
    /// byte, so it is rounded down to a multiple of 6 and saturates at 1530.
    SetLightsPattern {
        channel: LightChannel,
        effect: LightEffect,
        start: u8,
        end: u8,
        cycles_per_min: u16,
    },
    SetSdkMode { on: bool, flags: u8 },
    Disconnect,
    Ping,
    GetVersion,
    GetBatteryLevel,
    Turn180,
    Turn { kind: TurnKind, trigger: TurnTrigger },
    SetConfigParams { super_code_parse_mask: u8, track_material: TrackMaterial },
}

/// Localization reading taken as the vehicle passes a marker on a piece.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    /// Sub-position within the piece
    pub position_marker: u8,
    /// Hardware identifier of the piece
    pub raw_piece_id: u8,
    pub offset: f32,
    pub speed: u16,
    pub is_clockwise: bool,
}

/// Reported when the vehicle crosses from one piece to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionUpdate {
    pub road_piece_idx: u8,
    pub offset: f32,
    pub is_clockwise: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub on_charger: bool,
    pub battery_low: bool,
    pub battery_full: bool,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    PingResponse,
    VersionResponse { version: u16 },
    PositionUpdate(PositionUpdate),
    TransitionUpdate(TransitionUpdate),
    Delocalized,
    BatteryResponse { level: u16 },
    StatusUpdate(StatusUpdate),
    SpeedUpdate { speed: u16 },
    OffsetFromRoadCenterUpdate { offset: f32 },
    CycleOvertime,
    Collision,
    CarError,
    /// Any message id this crate does not know, kept verbatim
    Unknown { raw_id: u8, raw_bytes: Vec<u8> },
}
