//! Source analysis for C/C++ files.
//!
//! The pipeline only depends on the [`SourceAnalyzer`] trait; the production
//! implementation parses files with tree-sitter.

pub mod tree_sitter;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use tree_sitter::TreeSitterAnalyzer;

/// Source language of an analyzed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    C,
    Cpp,
}

impl SourceLanguage {
    /// Detect the language from a file extension.
    ///
    /// Headers are treated as C++ only when the extension is unambiguous
    /// (`.hpp`, `.hxx`); plain `.h` defaults to C.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "c" | "h" => Some(SourceLanguage::C),
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Some(SourceLanguage::Cpp),
            _ => None,
        }
    }

    /// File extension used for generated test files in this language.
    pub fn test_extension(&self) -> &'static str {
        match self {
            SourceLanguage::C => "c",
            SourceLanguage::Cpp => "cpp",
        }
    }
}

impl std::fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLanguage::C => write!(f, "c"),
            SourceLanguage::Cpp => write!(f, "cpp"),
        }
    }
}

/// A single function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub type_name: String,
    pub position: usize,
}

/// Structured information about one function extracted from source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<ParameterInfo>,
    pub is_static: bool,
    pub language: SourceLanguage,
    pub file: PathBuf,
    pub line: usize,
    pub body: String,
}

impl FunctionInfo {
    /// Human-readable signature, used in prompts and logs.
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.type_name, p.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} {}({})", self.return_type, self.name, params)
    }
}

/// Extracts function descriptors from a source file.
///
/// Implementations may block (parsing is CPU-bound); callers run them off
/// the async dispatch path via `spawn_blocking`. Failures are per-file and
/// must never poison the analyzer for subsequent calls.
pub trait SourceAnalyzer: Send + Sync {
    fn analyze(&self, file_path: &Path, compile_args: &[String]) -> Result<Vec<FunctionInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_path() {
        assert_eq!(
            SourceLanguage::from_path(Path::new("foo/bar.c")),
            Some(SourceLanguage::C)
        );
        assert_eq!(
            SourceLanguage::from_path(Path::new("bar.cpp")),
            Some(SourceLanguage::Cpp)
        );
        assert_eq!(
            SourceLanguage::from_path(Path::new("bar.hpp")),
            Some(SourceLanguage::Cpp)
        );
        assert_eq!(
            SourceLanguage::from_path(Path::new("bar.h")),
            Some(SourceLanguage::C)
        );
        assert_eq!(SourceLanguage::from_path(Path::new("bar.py")), None);
        assert_eq!(SourceLanguage::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_signature_formatting() {
        let func = FunctionInfo {
            name: "add".to_string(),
            return_type: "int".to_string(),
            parameters: vec![
                ParameterInfo {
                    name: "a".to_string(),
                    type_name: "int".to_string(),
                    position: 0,
                },
                ParameterInfo {
                    name: "b".to_string(),
                    type_name: "int".to_string(),
                    position: 1,
                },
            ],
            is_static: false,
            language: SourceLanguage::C,
            file: PathBuf::from("math.c"),
            line: 3,
            body: String::new(),
        };
        assert_eq!(func.signature(), "int add(int a, int b)");
    }
}
