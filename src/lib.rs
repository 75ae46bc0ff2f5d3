//! NutriSnap server library, shared by the `nutrisnap-server` and
//! `nutrisnap-admin` binaries.

pub mod config;
pub mod server;

pub use config::{ApiKeyEntry, ConfigError, ConfigFile, ServerConfig};
