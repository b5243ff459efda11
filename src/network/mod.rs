//! Transport listeners feeding the uniform framed-stream interface.

mod gateway;
mod ssh;
mod transport;

pub use gateway::Gateway;
pub use ssh::{spawn_ssh_listener, SshIdentity};
pub use transport::FramedTransport;
