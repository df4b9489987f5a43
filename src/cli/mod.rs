//! Command-line interface for depot.
//!
//! This module provides the CLI argument parsing using clap's derive macros
//! and the command implementations.
//!
//! # Architecture
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{Cli, ClearArgs, Commands, CompletionsArgs, GetArgs, ListArgs};
pub use commands::dispatch;
