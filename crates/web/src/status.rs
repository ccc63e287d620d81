//! Status code classes the response logic branches on.

use http::StatusCode;

/// Statuses whose responses must not carry a body.
pub fn is_empty(status: StatusCode) -> bool {
    matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED)
}

pub fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MULTIPLE_CHOICES
            | StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::USE_PROXY
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// The reason phrase, or the numeric code for statuses without one.
pub fn message(status: StatusCode) -> String {
    status.canonical_reason().map_or_else(|| status.as_str().to_owned(), str::to_owned)
}
