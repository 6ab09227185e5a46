//! Command tests for dump-manager
//!
//! These tests verify the behavior behind each CLI command using mocked
//! collaborators. Spawning the binary itself is covered by the root
//! crate's `tests/cli.rs`.

mod decompress;
mod decrypt;
mod list;
mod run;
mod setup;
mod validate;
