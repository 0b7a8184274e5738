pub mod protocol;
pub mod scan;
pub mod session;
pub mod sim;
pub mod track;
pub mod transport;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use protocol::{Command, ParseError, TelemetryEvent, decode_event, encode_command};
pub use scan::{CancelHandle, TrackScanner, filter_duplicates};
pub use session::{Session, SessionState, VehicleInfo, VehicleLink, model_name};
pub use track::{TrackLogEntry, TrackPieceKind, classify};
pub use transport::{ChannelTransport, Transport};
