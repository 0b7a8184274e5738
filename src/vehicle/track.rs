//! Track pieces and the entries of a discovered lap.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::protocol::PositionUpdate;

/// Semantic kind of a track piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackPieceKind {
    Straight,
    Curve,
    PreFinishLine,
    StartFinish,
    FnFPowerup,
    Intersection,
    Unknown,
}

impl TrackPieceKind {
    pub fn name(self) -> &'static str {
        match self {
            TrackPieceKind::Straight => "Straight",
            TrackPieceKind::Curve => "Curve",
            TrackPieceKind::PreFinishLine => "Pre-Finish Line",
            TrackPieceKind::StartFinish => "Start/Finish",
            TrackPieceKind::FnFPowerup => "FnF Powerup",
            TrackPieceKind::Intersection => "Intersection",
            TrackPieceKind::Unknown => "Unknown",
        }
    }

    /// The two halves of the finish piece that delimit a lap.
    pub fn is_lap_boundary(self) -> bool {
        matches!(self, TrackPieceKind::PreFinishLine | TrackPieceKind::StartFinish)
    }
}

impl fmt::Display for TrackPieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a hardware piece id to its kind. Defined for every byte value.
pub fn classify(raw_piece_id: u8) -> TrackPieceKind {
    match raw_piece_id {
        36 | 39 | 40 | 51 => TrackPieceKind::Straight,
        17 | 18 | 20 | 23 => TrackPieceKind::Curve,
        34 => TrackPieceKind::PreFinishLine,
        33 => TrackPieceKind::StartFinish,
        57 => TrackPieceKind::FnFPowerup,
        10 => TrackPieceKind::Intersection,
        _ => TrackPieceKind::Unknown,
    }
}

/// One localization reading, reduced to what the lap topology needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackLogEntry {
    pub kind: TrackPieceKind,
    pub clockwise: bool,
    pub position: u8,
}

impl TrackLogEntry {
    pub fn new(kind: TrackPieceKind, clockwise: bool, position: u8) -> Self {
        Self {
            kind,
            clockwise,
            position,
        }
    }
}

impl From<&PositionUpdate> for TrackLogEntry {
    fn from(update: &PositionUpdate) -> Self {
        Self::new(
            classify(update.raw_piece_id),
            update.is_clockwise,
            update.position_marker,
        )
    }
}

impl fmt::Display for TrackLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.clockwise { "cw" } else { "ccw" };
        write!(f, "{}@{} ({})", self.kind, self.position, direction)
    }
}
