//! Command line application

pub mod cli;
pub mod options;
pub mod report;
pub mod run;
