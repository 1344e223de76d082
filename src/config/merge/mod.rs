//! Source merging for agent configuration.

pub mod service;
