//! Transcript recording and end-of-call externalization.
//!
//! Each session owns one [`TranscriptRecorder`]. The bridge appends
//! finalized user/assistant turns as they arrive; every append is
//! durably written to a per-session JSON file so partial transcripts
//! survive a crash mid-call. When the call ends, [`TranscriptRecorder::close`]
//! pushes the transcript to the helpdesk system (contact → conversation →
//! messages), flags urgency when a human handoff was requested, and
//! attaches a generated summary.
//!
//! `close()` never panics past its boundary: every external failure is
//! caught, logged, and folded into the returned [`FlushResult`].

pub mod error;
pub mod helpdesk;
pub mod recorder;
pub mod summary;

pub use error::HelpdeskError;
pub use helpdesk::{HelpdeskClient, HelpdeskConfig};
pub use recorder::{FlushResult, TranscriptRecorder};
pub use summary::{Summarizer, SummaryConfig};
