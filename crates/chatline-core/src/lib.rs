//! # chatline-core
//!
//! Core crate for Chatline. Contains configuration schemas, typed
//! identifiers, the unified error system, and the shared state-store
//! trait used by the presence subsystem.
//!
//! This crate has **no** internal dependencies on other Chatline crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
