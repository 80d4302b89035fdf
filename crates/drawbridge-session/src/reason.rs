//! Close reasons that do not come from a [`SessionError`](crate::SessionError).

/// The status exchange finished and the connection is done.
pub const STATUS_ANSWERED: &str = "Status answered";

/// The client closed its end.
pub const PEER_DISCONNECTED: &str = "Disconnected";

/// The server is shutting down.
pub const SERVER_CLOSED: &str = "Server closed";
