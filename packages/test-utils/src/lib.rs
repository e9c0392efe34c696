//! Shared helpers for coordinator integration tests

mod fixtures;
mod server;

pub use fixtures::*;
pub use server::TestServer;
