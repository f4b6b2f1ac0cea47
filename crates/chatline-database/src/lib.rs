//! # chatline-database
//!
//! PostgreSQL access for Chatline. Contains the connection pool plus the
//! repositories backing the contact relation and the per-recipient message
//! delivery status tracker.
//!
//! Lookups against `contacts` and `message_status` tolerate an unmigrated
//! schema (undefined table) by returning empty results, so the presence
//! core keeps working during a rolling deployment.

pub mod connection;
pub mod repositories;

pub use repositories::contact::ContactRepository;
pub use repositories::message_status::MessageStatusRepository;
