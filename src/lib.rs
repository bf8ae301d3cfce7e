//! Session Review - Reconstruct and review agent session logs.

pub mod config;
pub mod conversation;
pub mod danger;
pub mod progress;
pub mod registry;
pub mod render;
pub mod server;
pub mod session;
