//! HTTP/1.x request serialization and response framing (spec.md §4.4):
//! chunked transfer with trailers, `Content-Length` and read-until-close
//! framing, and gzip/deflate content-decoding.

pub mod body;
mod chunked;
mod encoding;
mod request;
mod response;

pub use body::{Body, BodySink};
pub use encoding::ContentEncoding;
pub use request::write_request;
pub use response::{read_body, read_head};
