use thiserror::Error;

/// Why a fetch produced no payload. Every variant is retried the same way.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("{0}")]
    DataAbsent(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    DataAbsent,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Transport(_) | FetchError::Status { .. } => FailureKind::Transport,
            FetchError::GraphQl(_) | FetchError::DataAbsent(_) | FetchError::Decode(_) => {
                FailureKind::DataAbsent
            }
        }
    }
}
