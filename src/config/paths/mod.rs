//! Filesystem locations used by the agent.

pub mod xdg_root;
