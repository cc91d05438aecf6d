//! Remote-platform abstractions: update model, outbound actions, ports.

pub mod port;
pub mod throttled;
pub mod types;
