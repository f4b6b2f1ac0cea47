//! # chatline-auth
//!
//! Black-box identity verification for Chatline. The auth service issues
//! tokens elsewhere; this crate only answers "who is this token?" with a
//! typed failure for every way the answer can be no.

pub mod claims;
pub mod verifier;

pub use claims::Claims;
pub use verifier::{Identity, IdentityVerifier, TokenError, TokenVerifier};
