//! Error types for the translator.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the translator.
#[derive(Error, Debug)]
pub enum Error {
    /// Input too short or unrecognized IP version byte. The packet should
    /// be dropped; the translator state is unchanged.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// The configured MAC address is not a usable unicast address.
    #[error("invalid MAC address")]
    InvalidMac,

    /// A buffer allocation failed. Kept for FFI hosts that map allocator
    /// failure into this crate's error space; pure-Rust callers never see
    /// it because the global allocator aborts.
    #[error("buffer allocation failed")]
    OutOfMemory,
}

impl Error {
    /// Create a new invalid-packet error.
    pub fn invalid_packet<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPacket(msg.into())
    }
}
