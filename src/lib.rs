//! lskf-limiter - Software rate limiting for lock screen credentials
//!
//! This crate throttles guesses of a device's lock screen knowledge factor
//! (PIN, pattern or password) before they reach the hardware credential
//! check. It enforces an exponential backoff on real failures, suppresses
//! duplicate wrong guesses, keeps secrets in self-erasing buffers and
//! persists its failure counters so that a reboot cannot reset them.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod runtime;
pub mod storage;
