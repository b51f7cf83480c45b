use thiserror::Error;

/// Failures on the backend-side duplex connection.
///
/// These are transport-level: any of them is fatal to the session and
/// triggers the teardown cascade. Protocol-level problems (unparseable
/// messages) are logged and dropped instead, and never surface here.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("backend connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("backend send failed: {0}")]
    Send(tokio_tungstenite::tungstenite::Error),

    #[error("invalid backend endpoint: {0}")]
    Endpoint(String),
}
