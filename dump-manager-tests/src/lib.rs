//! Test utilities for dump-manager
//!
//! This crate provides shared test utilities, configuration builders and
//! fixtures for testing the dump-manager application. Mock collaborators
//! (transfer client, dumper, notifier) live in the main crate and are
//! re-exported here.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, TestContext};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_backup("shop"));
//!     let config_path = ctx.write_config();
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use dump_manager::config::{
    BackupConfig, Config, DbConnection, Destination, GlobalConfig, HostConfig, NotificationMethod,
    NotificationTarget, Protocol, ResolvedJobDescriptor, Secret, Timeouts,
};

// Re-export mock implementations from the main crate
pub use dump_manager::managers::notification::mock::MockNotifier;
pub use dump_manager::transfer::mock::{MockTransferClient, MockTransferFactory, TransferCall};
pub use dump_manager::transfer::TransferClient;
pub use dump_manager::utils::dump::mock::MockDumper;
pub use dump_manager::utils::DumpOperations;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
