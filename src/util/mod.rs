//! Utility types and functions.

pub mod backoff;

pub use backoff::SpinBackoff;
