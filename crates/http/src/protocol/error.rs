use http::StatusCode;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("unsupported transfer-encoding: {coding}")]
    UnsupportedTransferEncoding { coding: String },

    #[error("body size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeBody { current_size: u64, max_size: u64 },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn unsupported_transfer_encoding<S: ToString>(coding: S) -> Self {
        Self::UnsupportedTransferEncoding { coding: coding.to_string() }
    }

    pub fn too_large_body(current_size: u64, max_size: u64) -> Self {
        Self::TooLargeBody { current_size, max_size }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// The status used when the connection rejects a request that failed to parse.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TooLargeHeader { .. } | Self::TooManyHeaders { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            Self::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedTransferEncoding { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::InvalidVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("response is no longer writable")]
    Closed,

    #[error("request aborted by the client")]
    Aborted,

    #[error("connection broken: {reason}")]
    Broken { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid reason phrase: {phrase:?}")]
    InvalidReason { phrase: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_reason<S: ToString>(phrase: S) -> Self {
        Self::InvalidReason { phrase: phrase.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn broken<S: ToString>(str: S) -> Self {
        Self::Broken { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
