pub mod backoff;
pub mod buffer;
pub mod daemon;
pub mod transport;
pub mod validator;
pub mod ws_client;

pub use buffer::EventBuffer;
pub use daemon::{Daemon, DaemonReport, DaemonState};
pub use transport::{FeedTransport, TransportError};
pub use validator::Rejection;
pub use ws_client::WsTransport;
