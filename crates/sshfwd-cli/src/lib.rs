//! sshfwd daemon library
//!
//! Configuration loading and the daemon that ties the tunnel store,
//! supervisor and REST API together.

pub mod config;
pub mod daemon;
