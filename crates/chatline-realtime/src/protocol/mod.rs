//! Per-session presence protocol.

pub mod events;
pub mod handler;
pub mod rate_limit;

pub use events::{ErrorCode, InboundEvent, PresencePayload, SessionEvent};
pub use handler::{ActiveSession, SessionContext};
pub use rate_limit::StatusRateLimiter;
