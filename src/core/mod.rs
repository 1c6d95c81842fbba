pub mod config;
pub mod keyring;
