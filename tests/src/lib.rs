//! # Nexus Test Suite
//!
//! Unified test crate for behaviour that spans crates.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── publish_benchmarks.rs   # publish, match and history hot paths
//! │
//! └── src/integration/
//!     ├── properties.rs           # bus guarantees end to end
//!     └── bridge_flows.rs         # multi-bus forwarding and telemetry
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p nexus-tests
//!
//! # By category
//! cargo test -p nexus-tests integration::properties::
//! cargo test -p nexus-tests integration::bridge_flows::
//!
//! # Benchmarks
//! cargo bench -p nexus-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
