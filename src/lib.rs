//! Host-side control of small robotic race vehicles: the binary message
//! protocol, the per-vehicle session and discovery of the track layout.

pub mod config;
pub mod error;
pub mod vehicle;

pub use config::Config;
pub use error::{Error, Result};
