use thiserror::Error;

/// Failure to deliver a reminder through the push provider.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A multicast needs at least one device token.
    #[error("no device tokens to send to")]
    EmptyTokens,

    /// Provider settings are missing or unusable.
    #[error("push provider misconfigured: {0}")]
    Config(String),

    /// No bearer token could be obtained.
    #[error("push provider authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (connect, timeout, body).
    #[error("push transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("push provider rejected message: {status} {body}")]
    Rejected { status: u16, body: String },

    /// Some devices of a multicast were not reached. Every device is tried.
    #[error("{failed} of {total} deliveries failed, first: {first}")]
    Undelivered {
        failed: usize,
        total: usize,
        first: Box<DispatchError>,
    },
}
