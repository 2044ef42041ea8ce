//! Health checking: the HTTP transport and the interval poller that fans it
//! out over the poll list.

pub mod poller;
pub mod transport;

pub use poller::{PollerConfig, TokioHealthPoller, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
pub use transport::{HealthTransport, ReqwestTransport};
