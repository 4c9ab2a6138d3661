use thiserror::Error;

/// Fatal errors. Any of these aborts the whole trace.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Frontier bookkeeping bug: a discovered address was queued without an anchor
    #[error("Missing anchor timestamp for {address} at level {level}")]
    MissingAnchor { address: String, level: usize },
}

/// Failure of one `TransactionSource` call, after the source's own retries.
///
/// Distinct from an empty, successful result.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("History of {address} not exhausted after {pages} pages")]
    HistoryTruncated { address: String, pages: usize },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::Http {
                status: status.as_u16(),
            }
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

impl SourceError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) | SourceError::RateLimited => true,
            SourceError::Http { status } => *status >= 500,
            SourceError::Decode(_)
            | SourceError::HistoryTruncated { .. }
            | SourceError::Backend(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SourceError::RateLimited.is_retryable());
        assert!(SourceError::Transport("reset".into()).is_retryable());
        assert!(SourceError::Http { status: 503 }.is_retryable());
        assert!(!SourceError::Http { status: 404 }.is_retryable());
        assert!(!SourceError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn missing_anchor_message_names_address_and_level() {
        let err = TraceError::MissingAnchor {
            address: "bc1qxyz".into(),
            level: 3,
        };
        assert_eq!(
            err.to_string(),
            "Missing anchor timestamp for bc1qxyz at level 3"
        );
    }
}
