//! Error types for the request adapter.
//!
//! # Design
//! Two tiers that never mix. `ContractError` is a programmer mistake in the
//! options passed to `dispatch` (missing url, unsupported method, ...) and is
//! returned directly as `Err`. `TransportError` is a request-outcome failure
//! reported by the transport; it only ever travels through the rejection
//! channel of a `RequestHandle`. Non-2xx/3xx statuses are not errors at all
//! at this level: they reject the handle without any error value.

use thiserror::Error;

use crate::http::HttpMethod;

/// Violations of the `dispatch` contract. These indicate a bug in the
/// calling code, not a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("options.url is required")]
    MissingUrl,

    #[error("options.type \"{0}\" not supported")]
    UnsupportedMethod(String),

    #[error("options.dataType is required")]
    MissingDataType,

    #[error("options.dataType value \"{0}\" is not supported")]
    UnsupportedDataType(String),

    #[error("options.contentType is required if options.data is provided for {0}")]
    MissingContentType(HttpMethod),

    #[error("transport does not support method \"{0}\"")]
    MethodNotSupportedByTransport(HttpMethod),

    /// Browser environment with pass-through enabled, but no ajax function
    /// was configured to pass through to.
    #[error("an ajax pass-through is required when pass-through mode is enabled in a browser environment")]
    PassThroughUnavailable,
}

/// Failures reported by a transport through its completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request aborted")]
    Aborted,

    /// Connection, DNS, TLS or timeout failure.
    #[error("transport failure: {0}")]
    Io(String),

    /// The response arrived but its body could not be decoded.
    #[error("response body could not be parsed: {0}")]
    Parse(String),

    #[error("request body could not be encoded: {0}")]
    Encode(String),
}
