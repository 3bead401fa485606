//! # Integration Tests
//!
//! Flows exercised through public APIs only.

pub mod bridge_flows;
pub mod properties;
