//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the media import engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Time source abstraction
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the library and sync crates
//! depend on. It establishes the logging conventions and the event
//! broadcasting used to report import progress.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
