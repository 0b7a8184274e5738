mod constants;
mod encoding;
mod messages;
mod parsing;

pub use constants::*;
pub use encoding::{encode_command, encode_event};
pub use messages::*;
pub use parsing::{ParseError, decode_command, decode_event};
