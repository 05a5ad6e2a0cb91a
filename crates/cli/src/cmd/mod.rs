//! CLI command implementations

pub mod gen;
pub mod watch;
