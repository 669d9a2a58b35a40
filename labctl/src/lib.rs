//! labctl library
//!
//! Core modules for bootstrapping homelab clusters and fanning deployments
//! out to hosts over SSH.

pub mod app;
pub mod authn;
pub mod balancer;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod remote;
pub mod storage;
pub mod topology;
pub mod utils;
