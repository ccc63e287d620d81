//! Types shared by the codec, the connection and handlers.

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RawRequest;
pub use request::RequestHeader;

mod response;
pub use response::BoxedWriter;
pub use response::FinishListener;
pub use response::RawResponse;
pub use response::ResponseHead;
pub use response::SharedWriter;
pub(crate) use response::is_valid_reason;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
