use thiserror::Error;

/// Everything that can go wrong while keeping the replica in sync.
///
/// Only [`SyncError::Exchange`] escapes the sync loop. The rest are recovered
/// locally by reconnecting, refetching or dropping the offending frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by exchange (http {status})")]
    RateLimited { status: u16 },

    #[error("exchange rejected request: code {code}: {msg}")]
    Exchange { code: i64, msg: String },

    #[error("sequence gap: expected pu={expected}, got pu={got}")]
    ProtocolGap { expected: u64, got: u64 },

    #[error("malformed event: {0}")]
    Malformed(String),
}

impl SyncError {
    /// Fatal errors leave no path to a valid book.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Exchange { .. })
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Malformed(e.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exchange_errors_are_fatal() {
        assert!(SyncError::Exchange { code: -1121, msg: "Invalid symbol.".into() }.is_fatal());
        assert!(!SyncError::Network("reset".into()).is_fatal());
        assert!(!SyncError::RateLimited { status: 429 }.is_fatal());
        assert!(!SyncError::ProtocolGap { expected: 110, got: 109 }.is_fatal());
        assert!(!SyncError::Malformed("bad".into()).is_fatal());
    }

    #[test]
    fn gap_message_names_both_ids() {
        let e = SyncError::ProtocolGap { expected: 110, got: 109 };
        assert_eq!(e.to_string(), "sequence gap: expected pu=110, got pu=109");
    }
}
