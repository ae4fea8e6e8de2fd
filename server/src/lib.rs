//! Duck basketball relay library.
//!
//! This module exposes the relay components for use in tests and binaries.

pub mod config;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod relay_loop;
pub mod server;
pub mod ws;
