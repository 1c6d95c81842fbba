//! sessionward is an authenticated HTTP request layer for bearer-token APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`auth`] attaches credentials to outbound calls, refreshes expired access
//!   tokens with at most one refresh in flight, retries once, and ends the
//!   session when refresh is impossible.
//! - [`core`] owns configuration and keyring error handling.
//! - [`cli`] exposes login, logout, status, and raw authenticated requests.
//! - [`utils`] holds URL helpers and logging setup.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`].

pub mod auth;
pub mod cli;
pub mod core;
pub mod utils;
