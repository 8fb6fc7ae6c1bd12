use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Language tag attached to every scanned file. Drives which lexical rule set the extractor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageTag {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    Unknown,
}

impl LanguageTag {
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "rs" => Self::Rust,
            "py" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(LanguageTag::from_extension("rs"), LanguageTag::Rust);
        assert_eq!(LanguageTag::from_extension("PY"), LanguageTag::Python);
        assert_eq!(LanguageTag::from_extension("tsx"), LanguageTag::TypeScript);
        assert_eq!(LanguageTag::from_extension("h"), LanguageTag::C);
        assert_eq!(LanguageTag::from_extension("hpp"), LanguageTag::Cpp);
        assert_eq!(LanguageTag::from_extension("md"), LanguageTag::Unknown);
    }

    #[test]
    fn test_from_path_without_extension() {
        assert_eq!(LanguageTag::from_path(Path::new("Makefile")), LanguageTag::Unknown);
        assert_eq!(LanguageTag::from_path(Path::new("auth/login.py")), LanguageTag::Python);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&LanguageTag::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
        let tag: LanguageTag = serde_json::from_str("\"go\"").unwrap();
        assert_eq!(tag, LanguageTag::Go);
    }
}
