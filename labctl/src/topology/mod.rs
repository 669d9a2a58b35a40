//! Deployment topology

pub mod registry;

pub use registry::{HostsByRole, TopologyRegistry};
