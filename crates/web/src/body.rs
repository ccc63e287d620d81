use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BoxError, Result};

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// The response body a middleware assigns to the context.
///
/// What the finalizer writes depends on the variant: bytes and text as they are, streams
/// chunk by chunk without a length, JSON serialized.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    Stream(BodyStream),
    Json(Value),
}

impl Body {
    pub fn empty() -> Self {
        Self::Empty
    }

    /// A body streamed from any fallible stream of chunks.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::Stream(Box::pin(stream.map_err(Into::<BoxError>::into)))
    }

    /// A body streamed from an [`http_body::Body`]; trailers are dropped.
    pub fn from_http_body<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self::stream(body.into_data_stream())
    }

    /// Serializes `value` into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::from(serde_json::to_value(value)?))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Stream(_) => "stream",
            Self::Json(_) => "json",
        }
    }

    /// Byte length when it is known without consuming the body.
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Text(text) => Some(text.len() as u64),
            Self::Stream(_) | Self::Json(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
        }
    }
}

impl From<()> for Body {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

/// `null` is the empty body.
impl From<Value> for Body {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            value => Self::Json(value),
        }
    }
}

impl From<BodyStream> for Body {
    fn from(stream: BodyStream) -> Self {
        Self::Stream(stream)
    }
}

impl<T: Into<Body>> From<Option<T>> for Body {
    fn from(option: Option<T>) -> Self {
        option.map_or(Self::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use http_body_util::Full;
    use serde_json::json;
    use std::io;

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<Body>();
    }

    #[test]
    fn conversions() {
        assert!(Body::from(()).is_empty());
        assert!(Body::from(Value::Null).is_empty());
        assert!(Body::from(None::<String>).is_empty());
        assert_eq!(Body::from("hi").kind(), "text");
        assert_eq!(Body::from(vec![1u8, 2]).len_hint(), Some(2));
        assert_eq!(Body::from(json!({"a": 1})).kind(), "json");
        assert_eq!(Body::json(&[1, 2, 3]).unwrap().kind(), "json");
    }

    #[tokio::test]
    async fn stream_body() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))];
        let body = Body::stream(futures::stream::iter(chunks));
        assert!(body.is_stream());
        assert_eq!(body.len_hint(), None);

        let Body::Stream(mut stream) = body else { panic!("not a stream") };
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"b"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn http_body_adapter() {
        let Body::Stream(stream) = Body::from_http_body(Full::new(Bytes::from_static(b"full"))) else {
            panic!("not a stream")
        };
        let collected: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(collected, vec![Bytes::from_static(b"full")]);
    }
}
