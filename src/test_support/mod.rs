//! Shared helpers for unit tests.

pub(crate) mod recording_sink;
pub(crate) mod socket_guard;
