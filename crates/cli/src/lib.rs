//! s3c CLI library
//!
//! Exports the CLI components so the shell can be driven from integration tests.

pub mod commands;
pub mod exit_code;
pub mod output;
pub mod shell;
