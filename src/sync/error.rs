use super::models::EntityKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request to tracker API failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("tracker API responded {status}: {message}")]
    Server { status: u16, message: String },

    #[error("tracker API response has no id")]
    MissingId,

    #[error("{0} records cannot be deleted through the API")]
    Unsupported(EntityKind),

    #[error("no offline entry with local id {0}")]
    UnknownEntry(String),

    #[error("offline snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("offline snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SyncError {
    /// The server could not be reached or could not answer. Anything else
    /// is a verdict on the operation itself and retrying will not change it.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Server { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn server(status: u16) -> SyncError {
        SyncError::Server {
            status,
            message: String::new(),
        }
    }

    #[rstest]
    #[case(server(503), true)]
    #[case(server(500), true)]
    #[case(server(429), true)]
    #[case(server(400), false)]
    #[case(server(404), false)]
    #[case(SyncError::MissingId, false)]
    #[case(SyncError::Unsupported(EntityKind::TaskCompletion), false)]
    fn only_unreachable_servers_are_transient(#[case] error: SyncError, #[case] expected: bool) {
        assert_eq!(error.is_transient(), expected);
    }
}
