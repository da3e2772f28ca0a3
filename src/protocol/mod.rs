mod context;
mod http;
mod registry;
mod requester;
mod tcp;
mod traits;

#[cfg(test)]
pub(crate) mod test_support;
#[cfg(test)]
mod tests;

pub use context::RequesterContext;
pub use http::{HttpTransport, build_http_client};
pub use registry::{ProtocolTable, ProtocolTableError, RequesterCtor};
pub use requester::ProtocolRequester;
pub use tcp::{ConnectionPool, FramedConnection, TcpTransport, frame_codec, tcp_address};
pub use traits::{AttemptFailure, Requester, Target, Transport};
