//! Configuration loading and output formatting for the `linkpeek` binary.

pub mod config;
pub mod output;
