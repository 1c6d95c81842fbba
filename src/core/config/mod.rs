pub mod data;
pub mod io;


pub use data::{Config, CredentialBackendKind};
pub use io::ConfigError;
