//! Data model shared by the orchestration components

pub mod credential;
pub mod host;
pub mod task;
