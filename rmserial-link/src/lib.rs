//! # rmserial-link
//!
//! Frame transport over a serial byte channel.
//!
//! This crate provides:
//! - A blocking link for any `std::io::Read`/`Write` channel
//! - An async link over split tokio halves
//! - A callback-driven read loop that can be stopped and restarted without
//!   losing buffered bytes

pub mod blocking;
pub mod config;
pub mod error;
pub mod link;

pub use blocking::SerialLink;
pub use config::LinkConfig;
pub use error::LinkError;
pub use link::{AsyncLink, LoopExit, ReadLoop};
