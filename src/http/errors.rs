//! Classification of reqwest transport failures, shared by retries and user-facing messages.

use std::error::Error as StdError;
use std::io::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportFailure {
    TimedOut,
    Refused,
    Unreachable,
    Other,
}

impl TransportFailure {
    pub(crate) fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() || chain_mentions(err, ErrorKind::TimedOut, "timed out") {
            Self::TimedOut
        } else if err.is_connect() {
            if chain_mentions(err, ErrorKind::ConnectionRefused, "connection refused") {
                Self::Refused
            } else {
                Self::Unreachable
            }
        } else {
            Self::Other
        }
    }
}

/// Walks the source chain looking for an io error of `kind`, or a message containing `needle`.
fn chain_mentions(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current = Some(err);
    while let Some(cause) = current {
        let io_match = cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io_err| io_err.kind() == kind);
        if io_match || cause.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }
        current = cause.source();
    }
    false
}

/// Failures worth another attempt: anything that never produced a complete response.
pub(crate) fn is_retryable(err: &reqwest::Error) -> bool {
    match TransportFailure::classify(err) {
        TransportFailure::TimedOut | TransportFailure::Refused | TransportFailure::Unreachable => {
            true
        }
        TransportFailure::Other => err.is_request() || err.is_body(),
    }
}

/// Turns a transport failure into a message that tells the user what to check.
pub(crate) fn describe_request_error(err: &reqwest::Error, url: &str, timeout_secs: u64) -> String {
    match TransportFailure::classify(err) {
        TransportFailure::TimedOut => format!(
            "Request timed out after {}s while calling '{}'. \
             Check the provider's responsiveness or try a smaller prompt.",
            timeout_secs, url
        ),
        TransportFailure::Refused => format!(
            "Connection refused by '{}'. \
             Ensure the provider is running and base_url in the config file is correct.",
            url
        ),
        TransportFailure::Unreachable => format!(
            "Failed to connect to '{}'. \
             Check base_url in the config file and network connectivity.",
            url
        ),
        TransportFailure::Other => format!("Failed to call '{}': {}", url, err),
    }
}
