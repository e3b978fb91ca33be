//! Status code catalog and success classification.

/// Canonical reason phrases for the status codes legacy callers display.
pub const STATUS_CATALOG: &[(u16, &str)] = &[
    (200, "OK"),
    (201, "Created"),
    (202, "Accepted"),
    (204, "No Content"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (408, "Request Timeout"),
    (412, "Precondition Failed"),
    (500, "Internal Server Error"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
];

/// Reason phrase for `status`, or `""` for codes outside the catalog.
pub fn status_text(status: u16) -> &'static str {
    STATUS_CATALOG
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, text)| *text)
        .unwrap_or("")
}

/// A status is an error unless its leading decimal digit is 2 or 3.
/// A missing status counts as an error.
pub fn is_error_status(status: Option<u16>) -> bool {
    match status {
        Some(code) => !matches!(leading_digit(code), 2 | 3),
        None => true,
    }
}

fn leading_digit(mut code: u16) -> u16 {
    while code >= 10 {
        code /= 10;
    }
    code
}
