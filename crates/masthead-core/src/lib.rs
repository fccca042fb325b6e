//! Core types and trait definitions for the Masthead metering service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod error;
pub mod identity;
pub mod paywall;
pub mod policy;
pub mod store;
pub mod subscription;
pub mod view;

pub use error::{Error, Result};
