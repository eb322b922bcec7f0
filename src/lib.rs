// Library module for hashkeep
// Re-exports modules for use in integration tests and external crates

pub mod algorithm;
pub mod codec;
pub mod error;
pub mod format;
pub mod hasher;
pub mod paths;
pub mod reconcile;
pub mod record;
pub mod session;
pub mod walk;

pub use algorithm::Algorithm;
pub use codec::DigestEncoding;
pub use error::HashKeepError;
pub use format::{ChecksumLayout, ChecksumReader, ChecksumWriter, FormatConfig, TextEncoding};
pub use reconcile::{Operation, RunSummary, UpdateMode, UpdateOptions};
pub use record::{ChecksumRecord, DigestValue, FileStatus, RecordSet};
pub use session::HashSession;
