//! Integration tests for dump-manager
//!
//! `pipeline` drives whole jobs through the real local transfer client with
//! a mocked dumper and notifier. `mysql` needs Docker and a `mysqldump`
//! binary on the host.
//! Run the Docker tests with: `cargo test -p dump-manager-tests --test integration -- --ignored`

mod common;
mod mysql;
mod pipeline;
