//! Transport abstraction the adapter dispatches through.
//!
//! This module defines the seam between the adapter and the HTTP library
//! doing the actual I/O. A transport hands out a `NativeRequest` per method
//! and URL, and later runs it, reporting back exactly once through the
//! `Completion` it was given.

use std::fmt;
use std::sync::Arc;

use crate::error::TransportError;
use crate::http::{HttpMethod, NativeRequest, NativeResponse};

#[cfg(all(not(target_arch = "wasm32"), feature = "ureq"))]
mod ureq_3;

#[cfg(all(not(target_arch = "wasm32"), feature = "ureq"))]
pub use self::ureq_3::UreqTransport;

/// An HTTP library the adapter can dispatch through.
pub trait Transport: Send + Sync {
    /// Create the native request for `method` and `url`, or `None` if this
    /// transport does not support `method`.
    fn request(&self, method: HttpMethod, url: &str) -> Option<NativeRequest> {
        Some(NativeRequest::new(method, url))
    }

    /// Execute `request` and report its outcome through `completion`.
    ///
    /// Must not block the caller on network I/O. `completion` may run on any
    /// thread, and may also run before `end` returns.
    fn end(&self, request: NativeRequest, completion: Completion);
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn request(&self, method: HttpMethod, url: &str) -> Option<NativeRequest> {
        (**self).request(method, url)
    }

    fn end(&self, request: NativeRequest, completion: Completion) {
        (**self).end(request, completion)
    }
}

/// Single-shot continuation a transport reports its outcome through.
pub struct Completion(Box<dyn FnOnce(Option<TransportError>, Option<NativeResponse>) + Send>);

impl Completion {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Option<TransportError>, Option<NativeResponse>) + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Report the outcome. Consumes the completion.
    pub fn complete(self, error: Option<TransportError>, response: Option<NativeResponse>) {
        (self.0)(error, response)
    }

    pub fn succeed(self, response: NativeResponse) {
        self.complete(None, Some(response))
    }

    pub fn fail(self, error: TransportError) {
        self.complete(Some(error), None)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}
