//! # Palaver Config
//!
//! Type-safe configuration management for Palaver.
//!
//! This crate provides the configuration schema, its defaults, and a loader
//! that reads YAML or TOML files and applies environment overrides before
//! validating the result.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod defaults;
pub mod loader;
pub mod schema;

pub use defaults::*;
pub use loader::*;
pub use schema::*;
