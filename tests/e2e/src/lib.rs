//! End-to-End Test Framework for Switchyard
//!
//! Runs whole routers (broker, workers, interceptors, channels) built from
//! TOML topologies and checks the traffic that comes out of them.

pub mod fixtures;
pub mod framework;
pub mod scenarios;

pub use fixtures::*;
pub use framework::{init_test_tracing, Harness, TestConfig, TestFramework, TestMetrics, TestResult, TestScenario};
pub use scenarios::*;
