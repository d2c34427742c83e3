//! Transfer error type for retry classification.

use std::fmt;

/// Error from a single probe or segment transfer. Kept as a plain enum so the
/// classifier can decide retries before the error is folded into the public
/// `EngineError` taxonomy.
#[derive(Debug)]
pub enum TransferError {
    /// libcurl reported an error (timeout, connection, DNS, etc.).
    Curl(curl::Error),
    /// HTTP response had an unexpected status.
    Http(u32),
    /// A range was requested but the server answered with a full-content
    /// response. Writing it at the segment offset would corrupt the file.
    RangeNotHonored { status: u32 },
    /// Transfer ended with fewer bytes than the remaining segment length
    /// (e.g. server closed early). Retryable; the watermark stays valid.
    PartialTransfer { expected: u64, received: u64 },
    /// Disk/storage write failed (disk full, permissions). Not retried.
    Storage(std::io::Error),
    /// Transfer stopped by the job's cancellation token.
    Cancelled,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::RangeNotHonored { status } => {
                write!(f, "range request not honored (HTTP {})", status)
            }
            TransferError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            TransferError::Storage(e) => write!(f, "storage: {}", e),
            TransferError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            _ => None,
        }
    }
}
