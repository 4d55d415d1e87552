//! Identity verification: step orchestration over external registries.

pub mod api;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod flow;
pub mod gateway;
pub mod notify;
pub mod orchestrator;
pub mod otp;
pub mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod validation;
