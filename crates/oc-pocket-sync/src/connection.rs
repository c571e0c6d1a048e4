//! Realtime connection state.

use std::time::Duration;

use tokio::sync::watch;

/// State of the notification stream, as shown to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not running, or stopped after the server rejected the credentials.
    #[default]
    Disconnected,
    /// Opening the stream.
    Connecting,
    /// Stream open and resynced.
    Connected,
    /// Waiting before the next attempt.
    Reconnecting {
        /// Consecutive failed attempts.
        attempt: u32,
        /// Delay before the next attempt, jitter included.
        retry_in: Duration,
    },
}

impl ConnectionState {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Resets the published state to `Disconnected` when the run loop ends,
/// including when its future is dropped.
pub(crate) struct DisconnectOnDrop<'a>(pub(crate) &'a watch::Sender<ConnectionState>);

impl Drop for DisconnectOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(ConnectionState::Disconnected);
    }
}
