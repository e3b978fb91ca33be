//! jQuery-ajax compatible request adapter.
//!
//! # Overview
//! Code written against `jQuery.ajax` passes an options object (`url`,
//! `type`, `dataType`, `data`, callbacks) and gets back a promise-like jqXHR.
//! `requ` accepts the same options, drives the request through a pluggable
//! [`Transport`], and returns a [`RequestHandle`] with the same settlement
//! semantics and response fields.
//!
//! # Design
//! - [`AdapterConfig`] replaces process-wide mutable state: environment,
//!   pass-through, hooks and event listeners are fixed when it is built.
//! - An [`Adapter`] owns at most one in-flight request. [`dispatch`] creates a
//!   fresh one per call.
//! - Malformed options are returned as [`ContractError`]. Failures of the
//!   request itself reject the handle.
//! - The `ureq` feature (on by default) provides [`UreqTransport`].

pub mod adapter;
pub mod config;
pub mod deferred;
pub mod error;
pub mod http;
pub mod options;
pub mod query;
pub mod status;
pub mod transport;

pub use adapter::{dispatch, Adapter};
pub use config::{AdapterConfig, AdapterConfigBuilder, AjaxPassThrough, Environment};
pub use deferred::{
    CallbackContext, Deferred, ReadyState, Rejection, RequestHandle, Resolution, Settlement, TextStatus,
    XhrFields,
};
pub use error::{ContractError, TransportError};
pub use http::{
    AbortSignal, DataType, HttpMethod, NativeRequest, NativeResponse, PlainResponse, ResponseShape,
    TransportEvent, XhrResponse,
};
pub use options::{EffectiveSettings, RequestOptions};
pub use transport::{Completion, Transport};

#[cfg(all(not(target_arch = "wasm32"), feature = "ureq"))]
pub use transport::UreqTransport;
