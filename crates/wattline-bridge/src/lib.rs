//! The session bridge: one call, two duplex connections.
//!
//! Each active call owns a caller-side connection (telephony media
//! stream or browser WebSocket) and a backend-side connection (realtime
//! speech API). The bridge relays audio both ways in strict order,
//! buffers inbound audio until the backend handshake completes, handles
//! barge-in (clear the playback buffer first, then cancel the active
//! response), dispatches tool calls without blocking audio, and feeds
//! finalized transcript turns to the recorder.
//!
//! The relay logic is written once, generically, over the
//! [`CallTransport`] trait; the server crate provides the phone and
//! browser adapters. All per-session state is owned by a single event
//! loop task — there is no locking because there is no concurrent
//! mutation within a session.

pub mod backend;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use backend::{BackendConfig, RealtimeClient};
pub use error::BridgeError;
pub use protocol::{BackendEvent, CallEvent};
pub use session::{run_session, SessionServices};
pub use transport::{CallTransport, ToolStatus, TransportSignal};
