//! Citation-backed memory: durable facts about a repository, each pointing
//! at the file/line evidence that supports it.

pub mod clock;
pub mod fs;
pub mod search;
pub mod store;
pub mod types;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fs::{FileSystem, LocalFileSystem};
pub use store::{MemorySearch, MemoryStore};
pub use types::{
    Citation, CitationCheck, CitationInput, CitationIssue, CreatedBy, Memory, MemoryStatistics,
    MemoryStatus, MemoryUpdate, Provenance, RecommendedAction, ValidationResult,
};
