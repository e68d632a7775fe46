use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use testgen::analyzer::{FunctionInfo, ParameterInfo, SourceAnalyzer, SourceLanguage};

/// Analyzer returning a fixed set of functions per file, with optional
/// per-file failures. Keeps pipeline tests independent of tree-sitter.
pub struct MockAnalyzer {
    functions_per_file: usize,
    failing_files: HashSet<PathBuf>,
}

impl MockAnalyzer {
    pub fn new(functions_per_file: usize) -> Self {
        Self {
            functions_per_file,
            failing_files: HashSet::new(),
        }
    }

    /// Make `analyze` fail for the given file.
    pub fn failing_on(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing_files.insert(path.into());
        self
    }
}

impl SourceAnalyzer for MockAnalyzer {
    fn analyze(&self, file_path: &Path, _compile_args: &[String]) -> Result<Vec<FunctionInfo>> {
        if self.failing_files.contains(file_path) {
            bail!("parse error in {}", file_path.display());
        }

        let stem = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file")
            .to_string();

        Ok((0..self.functions_per_file)
            .map(|i| FunctionInfo {
                name: format!("{stem}_fn{i}"),
                return_type: "int".to_string(),
                parameters: vec![ParameterInfo {
                    name: "value".to_string(),
                    type_name: "int".to_string(),
                    position: 0,
                }],
                is_static: false,
                language: SourceLanguage::from_path(file_path).unwrap_or(SourceLanguage::C),
                file: file_path.to_path_buf(),
                line: 10 + i,
                body: format!("int {stem}_fn{i}(int value) {{ return value + {i}; }}"),
            })
            .collect())
    }
}
