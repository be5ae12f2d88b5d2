//! Shared setup for the integration test targets.

pub mod fixtures;
