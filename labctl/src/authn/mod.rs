//! Join credentials

pub mod credential_mngr;
pub mod secret;
