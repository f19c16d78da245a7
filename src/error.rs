//! Error types for connections, codec, pool, ledger and pipeline

use thiserror::Error;

/// Errors produced by the engine
#[derive(Error, Debug)]
pub enum NntpError {
    /// IO error during network or file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transient transport failure; the operation may succeed on a fresh connection
    #[error("Transient IO error: {0}")]
    TransientIo(String),

    /// TLS error during secure connection
    #[error("TLS error: {0}")]
    Tls(String),

    /// Operation exceeded its timeout
    #[error("Operation timed out")]
    Timeout,

    /// Connection closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// NNTP protocol error with response code
    #[error("NNTP error {code}: {message}")]
    Protocol {
        /// NNTP response code (e.g., 411, 430, 502)
        code: u16,
        /// Error message from server
        message: String,
    },

    /// Server rejected the supplied credentials
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// Server does not support or need authentication
    #[error("Authentication unsupported: {0}")]
    AuthUnsupported(String),

    /// Server refused the article (policy, duplicate message-id, posting not allowed)
    #[error("Post rejected: {0}")]
    PostRejected(String),

    /// No such article
    #[error("No such article: {0}")]
    NoSuchArticle(String),

    /// No such newsgroup
    #[error("No such newsgroup: {0}")]
    NoSuchGroup(String),

    /// Decoded bytes do not match the declared CRC32
    #[error("Checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// CRC32 declared by the sender
        expected: u32,
        /// CRC32 computed over the recovered bytes
        actual: u32,
    },

    /// Multi-part transfer is missing parts
    #[error("Incomplete transfer: missing parts {missing:?}")]
    IncompleteTransfer {
        /// 1-based part numbers that were never received
        missing: Vec<u32>,
    },

    /// No provider had capacity before the acquire deadline
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Malformed yEnc payload or encoder misuse
    #[error("Codec error: {0}")]
    Codec(String),

    /// Article is missing required fields or violates its part invariants
    #[error("Invalid article: {0}")]
    InvalidArticle(String),

    /// Malformed NZB manifest
    #[error("NZB error: {0}")]
    Nzb(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Segment ledger failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] sqlx::Error),

    /// Job was cancelled by the operator
    #[error("Cancelled")]
    Cancelled,

    /// UTF-8 decoding error
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias using NntpError
pub type Result<T> = std::result::Result<T, NntpError>;

/// Classifies errors by whether retrying on another connection can help
pub trait IsRetryable {
    /// True when the same operation may succeed if tried again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for NntpError {
    fn is_retryable(&self) -> bool {
        match self {
            NntpError::Io(_)
            | NntpError::TransientIo(_)
            | NntpError::Tls(_)
            | NntpError::Timeout
            | NntpError::ConnectionClosed
            | NntpError::InvalidResponse(_)
            | NntpError::PoolExhausted => true,
            // 4xx other than the article/posting/auth families are "try again later"
            NntpError::Protocol { code, .. } => {
                (400..500).contains(code) && !matches!(code, 411 | 423 | 430 | 440 | 441 | 481)
            }
            _ => false,
        }
    }
}

impl NntpError {
    /// True for failures that say something about the provider itself
    /// (transport, TLS, auth) rather than about a single article.
    ///
    /// These count toward the provider's consecutive-failure threshold.
    pub fn is_provider_fault(&self) -> bool {
        matches!(
            self,
            NntpError::Io(_)
                | NntpError::TransientIo(_)
                | NntpError::Tls(_)
                | NntpError::Timeout
                | NntpError::ConnectionClosed
                | NntpError::InvalidResponse(_)
                | NntpError::AuthRejected(_)
                | NntpError::AuthUnsupported(_)
        ) || matches!(self, NntpError::Protocol { code, .. } if *code == 400 || *code == 502)
    }

    /// Collapse transport-level variants into [`NntpError::TransientIo`]
    pub fn into_transient(self) -> NntpError {
        match self {
            NntpError::Io(e) => NntpError::TransientIo(e.to_string()),
            NntpError::Timeout => NntpError::TransientIo("timed out".to_string()),
            NntpError::ConnectionClosed => {
                NntpError::TransientIo("connection closed".to_string())
            }
            NntpError::Tls(e) => NntpError::TransientIo(format!("TLS: {e}")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(NntpError::Timeout.is_retryable());
        assert!(NntpError::TransientIo("reset".into()).is_retryable());
        assert!(NntpError::PoolExhausted.is_retryable());
        assert!(
            NntpError::Protocol {
                code: 400,
                message: "busy".into()
            }
            .is_retryable()
        );

        assert!(!NntpError::NoSuchArticle("<a@b>".into()).is_retryable());
        assert!(!NntpError::PostRejected("dup".into()).is_retryable());
        assert!(!NntpError::AuthRejected("bad".into()).is_retryable());
        assert!(
            !NntpError::ChecksumMismatch {
                expected: 1,
                actual: 2
            }
            .is_retryable()
        );
        assert!(
            !NntpError::Protocol {
                code: 430,
                message: "gone".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_provider_fault() {
        assert!(NntpError::AuthRejected("x".into()).is_provider_fault());
        assert!(NntpError::ConnectionClosed.is_provider_fault());
        assert!(!NntpError::NoSuchArticle("x".into()).is_provider_fault());
        assert!(!NntpError::PostRejected("x".into()).is_provider_fault());
    }

    #[test]
    fn test_into_transient() {
        let e = NntpError::Timeout.into_transient();
        assert!(matches!(e, NntpError::TransientIo(_)));

        let e = NntpError::NoSuchArticle("x".into()).into_transient();
        assert!(matches!(e, NntpError::NoSuchArticle(_)));
    }

    #[test]
    fn test_checksum_display() {
        let e = NntpError::ChecksumMismatch {
            expected: 0xdeadbeef,
            actual: 0x1,
        };
        assert_eq!(
            e.to_string(),
            "Checksum mismatch: expected deadbeef, got 00000001"
        );
    }
}
