//! Unit tests for dump-manager
//!
//! These tests exercise the library through its public API: configuration
//! files, retention selection, encryption, and the local transfer client.

mod encryption;
mod retention;
