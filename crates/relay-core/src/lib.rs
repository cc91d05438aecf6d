//! Core of the update relay: dedup store, dispatch derivation, and the
//! fetch/dedup/record/dispatch pipeline.
//!
//! This crate is framework-agnostic. The Telegram transport lives behind the
//! ports in `messaging::port`, implemented in adapter crates.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod pipeline;
pub mod store;
pub mod utils;

pub use errors::{Error, Result};
