//! Cluster bootstrap and fan-out deployment

pub mod action;
pub mod bootstrap;
pub mod fanout;
pub mod flavor;
pub mod fsm;
pub mod retry;

pub use action::{Action, ContainerSpec};
pub use bootstrap::{BootstrapOrchestrator, BootstrapRequest};
pub use fanout::{FanoutDeployer, FanoutOptions, HostRun};
