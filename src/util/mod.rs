//! Shared utilities

pub mod time;
