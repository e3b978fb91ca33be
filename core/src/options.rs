//! jQuery-ajax style request options and the settings derived from them.
//!
//! # Design
//! `RequestOptions` is what callers hand to `dispatch`. Known fields are
//! typed; every other key lands in `extra` so option validation can warn
//! about jQuery options the adapter ignores, and so the pass-through path can
//! forward them untouched. Callbacks are not serializable and live in
//! `Callbacks`, set from code.
//!
//! `EffectiveSettings` is the result of merging options with the jQuery
//! defaults. It is frozen in an `Arc` at dispatch time and serves as the
//! default callback context.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::deferred::{CallbackContext, Rejection, Resolution, Settlement};
use crate::error::ContractError;
use crate::http::{DataType, HttpMethod};

/// Options the direct-dispatch path understands.
pub const ALLOWED_OPTIONS: &[&str] = &[
    "url",
    "type",
    "dataType",
    "contentType",
    "data",
    "success",
    "error",
    "complete",
    "headers",
    "context",
];

/// Every option `jQuery.ajax` recognizes.
pub const JQUERY_AJAX_OPTIONS: &[&str] = &[
    "accepts",
    "async",
    "beforeSend",
    "cache",
    "complete",
    "contents",
    "contentType",
    "context",
    "converters",
    "crossDomain",
    "data",
    "dataFilter",
    "dataType",
    "error",
    "global",
    "headers",
    "ifModified",
    "isLocal",
    "jsonp",
    "jsonpCallback",
    "mimeType",
    "password",
    "processData",
    "scriptCharset",
    "statusCode",
    "success",
    "timeout",
    "traditional",
    "type",
    "url",
    "username",
    "xhr",
    "xhrFields",
];

pub type DoneCallback = Arc<dyn Fn(&CallbackContext, &Resolution) + Send + Sync>;
pub type FailCallback = Arc<dyn Fn(&CallbackContext, &Rejection) + Send + Sync>;
pub type AlwaysCallback = Arc<dyn Fn(&CallbackContext, &Settlement) + Send + Sync>;

/// Caller callbacks. `success`/`done`, `error`/`fail` and
/// `complete`/`always` are aliases; the jQuery name wins when both are set.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub success: Option<DoneCallback>,
    pub error: Option<FailCallback>,
    pub complete: Option<AlwaysCallback>,
    pub done: Option<DoneCallback>,
    pub fail: Option<FailCallback>,
    pub always: Option<AlwaysCallback>,
}

impl Callbacks {
    pub fn on_done(&self) -> Option<&DoneCallback> {
        self.success.as_ref().or(self.done.as_ref())
    }

    pub fn on_fail(&self) -> Option<&FailCallback> {
        self.error.as_ref().or(self.fail.as_ref())
    }

    pub fn on_always(&self) -> Option<&AlwaysCallback> {
        self.complete.as_ref().or(self.always.as_ref())
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("done", &self.on_done().is_some())
            .field("fail", &self.on_fail().is_some())
            .field("always", &self.on_always().is_some())
            .finish()
    }
}

/// A jQuery.ajax style options object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    #[serde(skip)]
    pub callbacks: Callbacks,

    /// Any other option, e.g. `timeout` or `cache`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestOptions {
    pub fn new(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    /// Build options from a JSON options object.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn data_type(mut self, data_type: &str) -> Self {
        self.data_type = Some(data_type.to_string());
        self
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Set `data`. Non-object values are ignored.
    pub fn data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Set an option outside the typed subset.
    pub fn option(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn success<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallbackContext, &Resolution) + Send + Sync + 'static,
    {
        self.callbacks.success = Some(Arc::new(f));
        self
    }

    pub fn error<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallbackContext, &Rejection) + Send + Sync + 'static,
    {
        self.callbacks.error = Some(Arc::new(f));
        self
    }

    pub fn complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallbackContext, &Settlement) + Send + Sync + 'static,
    {
        self.callbacks.complete = Some(Arc::new(f));
        self
    }

    pub fn done<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallbackContext, &Resolution) + Send + Sync + 'static,
    {
        self.callbacks.done = Some(Arc::new(f));
        self
    }

    pub fn fail<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallbackContext, &Rejection) + Send + Sync + 'static,
    {
        self.callbacks.fail = Some(Arc::new(f));
        self
    }

    pub fn always<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallbackContext, &Settlement) + Send + Sync + 'static,
    {
        self.callbacks.always = Some(Arc::new(f));
        self
    }

    /// jQuery options present here that the direct-dispatch path ignores.
    pub fn unsupported_options(&self) -> Vec<&str> {
        self.extra
            .keys()
            .map(String::as_str)
            .filter(|key| JQUERY_AJAX_OPTIONS.contains(key) && !ALLOWED_OPTIONS.contains(key))
            .collect()
    }

}

/// Options merged with defaults, as observed by callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveSettings {
    pub url: String,
    #[serde(rename = "type")]
    pub method: HttpMethod,
    pub data_type: DataType,
    pub content_type: Option<String>,
    pub data: Option<Map<String, Value>>,
    pub headers: BTreeMap<String, String>,
    pub context: Option<Value>,
    #[serde(rename = "async")]
    pub is_async: bool,
    pub accepts: BTreeMap<String, String>,
    pub global: bool,
    pub cross_domain: bool,
    pub process_data: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EffectiveSettings {
    /// Merge `options` with the jQuery defaults and check the `dispatch`
    /// contract. The method defaults to GET when absent.
    pub fn from_options(options: &RequestOptions) -> Result<Self, ContractError> {
        let method = match options.method.as_deref() {
            Some(method) => method.parse::<HttpMethod>()?,
            None => HttpMethod::Get,
        };
        let url = match options.url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => return Err(ContractError::MissingUrl),
        };
        // Any `data`, even `{}`, needs a content type on a body method.
        if options.data.is_some() && method.has_body() && options.content_type.is_none() {
            return Err(ContractError::MissingContentType(method));
        }
        let data_type = options
            .data_type
            .as_deref()
            .ok_or(ContractError::MissingDataType)?
            .parse::<DataType>()?;

        let mut extra = options.extra.clone();
        let is_async = take_bool(&mut extra, "async").unwrap_or(true);
        let global = take_bool(&mut extra, "global").unwrap_or(false);
        let cross_domain = take_bool(&mut extra, "crossDomain").unwrap_or(false);
        let process_data = take_bool(&mut extra, "processData").unwrap_or(true);
        let accepts = match extra.remove("accepts") {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k, v.to_string())))
                .collect(),
            _ => default_accepts(),
        };

        Ok(Self {
            url,
            method,
            data_type,
            content_type: options.content_type.clone(),
            data: options.data.clone(),
            headers: options.headers.clone(),
            context: options.context.clone(),
            is_async,
            accepts,
            global,
            cross_domain,
            process_data,
            extra,
        })
    }

    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|data| !data.is_empty())
    }
}

fn take_bool(extra: &mut Map<String, Value>, key: &str) -> Option<bool> {
    match extra.remove(key) {
        Some(Value::Bool(b)) => Some(b),
        Some(other) => {
            extra.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

fn default_accepts() -> BTreeMap<String, String> {
    [
        ("*", "*/*"),
        ("html", "text/html"),
        ("json", "application/json, text/javascript"),
        (
            "script",
            "text/javascript, application/javascript, application/ecmascript, application/x-ecmascript",
        ),
        ("text", "text/plain"),
        ("xml", "application/xml, text/xml"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
