//! Secret handling re-exports.
//!
//! Callers expose the database URL through these instead of depending on
//! `secrecy` directly.

pub use secrecy::{ExposeSecret, SecretString};
