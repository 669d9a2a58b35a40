//! On-disk settings and state

pub mod layout;
pub mod settings;
pub mod state;
