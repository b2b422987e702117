//! # thread-store
//!
//! Operational surface for thread-checkpoint stores: layered configuration, the
//! backend factory, logging setup and the `thread-store` admin command line.

pub mod cli;
pub mod config;
pub mod factory;
pub mod logging;

pub use cli::{execute, Cli, Commands, PageArgs};
pub use config::{BackendKind, ConfigLoader, StoreConfig};
pub use factory::open_saver;
