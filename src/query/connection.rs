//! Transport seam for streaming sessions.

use crate::error::SessionError;

/// A whole frame read from the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
    /// Binary, ping, pong and anything else the session ignores.
    Other,
}

/// Message-oriented duplex connection, such as an upgraded websocket.
///
/// Reads happen on the session thread only. Writes may come from any
/// subscription thread; the session serializes them, so implementations
/// need not.
pub trait Connection: Send + Sync + 'static {
    /// Block until the next frame arrives.
    fn read_frame(&self) -> Result<Frame, SessionError>;

    /// Send one text frame.
    fn write_text(&self, text: &str) -> Result<(), SessionError>;

    /// Remote address for logs.
    fn peer(&self) -> String;

    /// Release the transport. Called once when the session ends.
    fn close(&self) {}
}
