//! Message identifiers and fixed sizes for the vehicle radio protocol.
//!
//! Every frame starts with a size byte followed by one of these identifiers.
//! `C2V` messages travel from the controller to the vehicle, `V2C` messages
//! travel back.

/// Request that the vehicle drop the radio link (C2V)
pub const MSG_C2V_DISCONNECT: u8 = 0x0d;

/// Ping request (C2V)
pub const MSG_C2V_PING_REQUEST: u8 = 0x16;

/// Ping response (V2C)
pub const MSG_V2C_PING_RESPONSE: u8 = 0x17;

/// Firmware version request (C2V)
pub const MSG_C2V_VERSION_REQUEST: u8 = 0x18;

/// Firmware version response (V2C)
pub const MSG_V2C_VERSION_RESPONSE: u8 = 0x19;

/// Battery level request (C2V)
pub const MSG_C2V_BATTERY_LEVEL_REQUEST: u8 = 0x1a;

/// Battery level response (V2C)
pub const MSG_V2C_BATTERY_LEVEL_RESPONSE: u8 = 0x1b;

/// Simple light mask (C2V)
pub const MSG_C2V_SET_LIGHTS: u8 = 0x1d;

/// Speed and acceleration (C2V)
pub const MSG_C2V_SET_SPEED: u8 = 0x24;

/// Lane change request (C2V)
pub const MSG_C2V_CHANGE_LANE: u8 = 0x25;

/// Cancel a pending lane change (C2V)
pub const MSG_C2V_CANCEL_LANE_CHANGE: u8 = 0x26;

/// Localization position update (V2C)
pub const MSG_V2C_LOCALIZATION_POSITION_UPDATE: u8 = 0x27;

/// Localization transition between pieces (V2C)
pub const MSG_V2C_LOCALIZATION_TRANSITION_UPDATE: u8 = 0x29;

/// Vehicle reported an internal error (V2C)
pub const MSG_V2C_CAR_ERROR: u8 = 0x2a;

/// Vehicle lost track of where it is (V2C)
pub const MSG_V2C_VEHICLE_DELOCALIZED: u8 = 0x2b;

/// Set the vehicle's internal offset from road center (C2V)
pub const MSG_C2V_SET_OFFSET_FROM_ROAD_CENTER: u8 = 0x2c;

/// Offset from road center changed (V2C)
pub const MSG_V2C_OFFSET_FROM_ROAD_CENTER_UPDATE: u8 = 0x2d;

/// Turn request, including the 180 degree turn (C2V)
pub const MSG_C2V_TURN: u8 = 0x32;

/// Light pattern configuration (C2V)
pub const MSG_C2V_LIGHTS_PATTERN: u8 = 0x33;

/// Vehicle speed changed (V2C)
pub const MSG_V2C_SPEED_UPDATE: u8 = 0x36;

/// Charger and battery status (V2C)
pub const MSG_V2C_STATUS_UPDATE: u8 = 0x3f;

/// Track configuration parameters (C2V)
pub const MSG_C2V_SET_CONFIG_PARAMS: u8 = 0x45;

/// Vehicle detected a collision (V2C)
pub const MSG_V2C_CAR_COLLISION: u8 = 0x4d;

/// Vehicle message loop overran its cycle (V2C)
pub const MSG_V2C_CAR_MESSAGE_CYCLE_OVERTIME: u8 = 0x86;

/// SDK mode toggle (C2V)
pub const MSG_C2V_SDK_MODE: u8 = 0x90;

/// Largest frame the vehicle accepts, size byte included.
pub const MSG_MAX_SIZE: usize = 20;

/// Bytes in front of every payload: the size byte and the message id.
pub const FRAME_HEADER_LEN: usize = 2;

/// SDK option that lets the controller override on-board localization.
/// Required before the vehicle accepts speed and lane commands.
pub const SDK_OPTION_OVERRIDE_LOCALIZATION: u8 = 0x01;

/// Value of the direction byte in a position update when driving clockwise.
pub const CLOCKWISE_SENTINEL: u8 = 0x47;

/// Light channel slots in a lights pattern frame.
pub const LIGHT_CHANNEL_COUNT_MAX: usize = 3;

/// Highest intensity the vehicle LEDs understand.
pub const MAX_LIGHT_INTENSITY: u8 = 14;

// Payload lengths, i.e. `size - 1` for each fixed-layout message.
pub(crate) const SET_SPEED_PAYLOAD_LEN: usize = 5;
pub(crate) const CHANGE_LANE_PAYLOAD_LEN: usize = 10;
pub(crate) const SET_OFFSET_PAYLOAD_LEN: usize = 4;
pub(crate) const SET_LIGHTS_PAYLOAD_LEN: usize = 1;
pub(crate) const LIGHT_CONFIG_LEN: usize = 5;
pub(crate) const LIGHTS_PATTERN_PAYLOAD_LEN: usize = 1 + LIGHT_CHANNEL_COUNT_MAX * LIGHT_CONFIG_LEN;
pub(crate) const SDK_MODE_PAYLOAD_LEN: usize = 2;
pub(crate) const TURN_PAYLOAD_LEN: usize = 2;
pub(crate) const CONFIG_PARAMS_PAYLOAD_LEN: usize = 2;

pub(crate) const VERSION_RESPONSE_PAYLOAD_LEN: usize = 2;
pub(crate) const BATTERY_RESPONSE_PAYLOAD_LEN: usize = 2;
pub(crate) const POSITION_UPDATE_PAYLOAD_LEN: usize = 9;
pub(crate) const TRANSITION_UPDATE_PAYLOAD_LEN: usize = 6;
pub(crate) const OFFSET_UPDATE_PAYLOAD_LEN: usize = 5;
pub(crate) const SPEED_UPDATE_PAYLOAD_LEN: usize = 2;
pub(crate) const STATUS_UPDATE_PAYLOAD_LEN: usize = 4;
