//! Implementation modules for `lifecycle`.
//!
//! `src/lifecycle.rs` is the stable facade; transitions, the callback
//! listener and the test probes live here.

pub(crate) mod listener;
pub(crate) mod probes;
pub(crate) mod transitions;

#[cfg(test)]
pub(crate) mod tests;
