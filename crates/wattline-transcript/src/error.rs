use thiserror::Error;

/// Failures from the helpdesk API.
#[derive(Error, Debug)]
pub enum HelpdeskError {
    #[error("helpdesk request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("helpdesk returned {status}: {detail}")]
    Status {
        status: reqwest::StatusCode,
        detail: String,
    },

    #[error("helpdesk response missing field: {0}")]
    MissingField(&'static str),
}
