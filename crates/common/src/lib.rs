//! Common utilities for usb-host
//!
//! This crate provides the ambient pieces shared by consumers of the access
//! layer: tracing setup and the TOML configuration file.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, LoggingSettings, UsbSettings};
pub use error::{Error, Result};
pub use logging::setup_logging;
