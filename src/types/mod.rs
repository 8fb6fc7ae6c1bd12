pub mod candidate;
pub mod facts;
pub mod language;
pub mod record;

pub use candidate::{Candidate, Rationale, Signal};
pub use facts::StructuralFacts;
pub use language::LanguageTag;
pub use record::{Digest, FileRecord, ScanGeneration, Tombstone};
