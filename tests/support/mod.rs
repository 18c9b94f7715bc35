//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod recorder;

// shared with the unit tests
#[path = "../../src/test_support/socket_guard.rs"]
pub mod socket_guard;
