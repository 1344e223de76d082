//! Integration tests for the mibd agent

mod lifecycle_memory;
mod standard_tree;
mod udp_agent;
