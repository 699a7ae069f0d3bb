//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem against
//! mock adapters. All tests run on the host with no hardware required.

#![cfg(not(target_os = "espidf"))]

mod end_to_end_tests;
mod gateway_tests;
mod mocks;
mod orchestrator_tests;
mod router_tests;
mod websocket_tests;
