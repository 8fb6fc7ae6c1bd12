pub mod discovery;
pub mod rules;

pub use discovery::{check_root, normalize_scope, RepositoryScanner, ScanEntry, ScanIter, ScanStats};
pub use rules::IgnoreRules;
