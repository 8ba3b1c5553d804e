//! HTTP plumbing shared by every provider call.
//!
//! The interesting surface is the [`HttpTransport`] trait: the api layer
//! talks to it, production wires in [`ReqwestTransport`], and tests swap in
//! fixture transports that replay canned bodies.

mod default_client;
mod error;
mod request;
mod transport;

pub use default_client::USER_AGENT;
pub use default_client::create_client;
pub use error::TransportError;
pub use request::Request;
pub use request::Response;
pub use transport::ByteStream;
pub use transport::HttpTransport;
pub use transport::ReqwestTransport;
pub use transport::StreamResponse;
