//! CLI commands.

pub mod run;
