//! CLI command implementations.

pub mod common;
pub mod fetch;
pub mod init;
