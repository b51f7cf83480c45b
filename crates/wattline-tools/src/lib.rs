//! Tool invocation for the wattline voice relay.
//!
//! The speech backend can request named actions mid-conversation. Most
//! tools are webhook-backed: the invoker POSTs the arguments plus a call
//! context envelope to a workflow endpoint and normalizes whatever comes
//! back into a uniform [`ToolOutcome`]. A few tools resolve locally
//! without touching the network (static informational lookups from the
//! app guide).
//!
//! Nothing in this crate panics or returns a transport error to callers:
//! every failure path resolves to a failure envelope so conversational
//! policy — owned by the backend's instructions — decides the spoken
//! recovery.

pub mod guide;
pub mod invoker;
pub mod schema;

pub use guide::{resolve_topic, topic_info, APP_GUIDE_TOOL, DEFAULT_TOPIC};
pub use invoker::{ActionConfig, ToolInvoker};
pub use wattline_types::{ToolCall, ToolOutcome};
