//! Remote command execution

pub mod command;
pub mod dry_run;
pub mod executor;
pub mod ssh;
pub mod transport;

pub use command::Command;
pub use executor::RemoteExecutor;
pub use transport::{Output, Session, Transport};
