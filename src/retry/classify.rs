//! Classify HTTP statuses and curl errors into retry policy error kinds.

use super::error::TransferError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
///
/// 4xx statuses are permanent: the request itself is wrong or the resource
/// is gone/denied, so repeating it cannot help. 408/429 and 5xx are server
/// conditions that a later attempt may not hit.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 | 429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Permanent,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Permanent
}

/// Classify a transfer error into an ErrorKind.
pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Curl(ce) => classify_curl_error(ce),
        TransferError::Http(code) => classify_http_status(*code),
        TransferError::RangeNotHonored { .. } => ErrorKind::Permanent,
        TransferError::PartialTransfer { .. } => ErrorKind::Connection,
        TransferError::Storage(_) => ErrorKind::Storage,
        TransferError::Cancelled => ErrorKind::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_statuses() {
        assert_eq!(classify_http_status(408), ErrorKind::Throttled);
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn http_4xx_permanent() {
        assert_eq!(classify_http_status(403), ErrorKind::Permanent);
        assert_eq!(classify_http_status(404), ErrorKind::Permanent);
        assert_eq!(classify_http_status(410), ErrorKind::Permanent);
        assert_eq!(classify_http_status(416), ErrorKind::Permanent);
    }

    #[test]
    fn range_not_honored_is_permanent() {
        let e = TransferError::RangeNotHonored { status: 200 };
        assert_eq!(classify(&e), ErrorKind::Permanent);
    }

    #[test]
    fn partial_transfer_is_transient() {
        let e = TransferError::PartialTransfer { expected: 100, received: 40 };
        assert_eq!(classify(&e), ErrorKind::Connection);
        assert!(classify(&e).is_transient());
    }

    #[test]
    fn storage_and_cancel_not_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "full");
        assert_eq!(classify(&TransferError::Storage(io)), ErrorKind::Storage);
        assert_eq!(classify(&TransferError::Cancelled), ErrorKind::Cancelled);
    }
}
