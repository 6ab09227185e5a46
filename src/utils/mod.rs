pub mod artifacts;
pub mod command;
pub mod compression;
pub mod cron;
pub mod dump;
pub mod encryption;
pub mod locker;
pub mod retention;

// Re-export commonly used types and traits (used by test crate)
pub use artifacts::ArtifactSet;
pub use dump::{DumpOperations, MysqlDumper};
pub use locker::JobLock;
