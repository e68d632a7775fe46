use std::path::{Path, PathBuf};
use std::sync::Arc;

use testgen::analyzer::SourceAnalyzer;
use testgen::compile_db::CompilationUnit;
use testgen::config::StreamingConfig;
use testgen::llm::LlmClient;
use testgen::pipeline::{DiscoveryFilter, FunctionFilter, PipelineDependencies};

/// A streaming configuration sized for tests: small queues, short
/// safety timeout, no metrics registry involvement.
pub fn test_streaming_config() -> StreamingConfig {
    StreamingConfig {
        max_queue_size: 16,
        max_concurrent_files: 2,
        max_concurrent_functions: 2,
        max_concurrent_llm_calls: 2,
        timeout_seconds: 30,
        retry_attempts: 1,
        enable_metrics: false,
    }
}

/// Dependencies wired with the given analyzer and client, output under
/// `output_dir`, and permissive filters.
pub fn test_dependencies(
    analyzer: Arc<dyn SourceAnalyzer>,
    llm_client: Arc<dyn LlmClient>,
    project_root: &Path,
    output_dir: &Path,
) -> PipelineDependencies {
    PipelineDependencies {
        analyzer,
        llm_client,
        discovery_filter: DiscoveryFilter::default(),
        function_filter: FunctionFilter::default(),
        project_root: project_root.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        observers: Vec::new(),
    }
}

/// Write `count` small C source files under `dir` and return one
/// compilation unit per file.
pub fn write_c_project(dir: &Path, count: usize) -> Vec<CompilationUnit> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("module_{i}.c"));
            std::fs::write(
                &path,
                format!("int module_{i}_fn(int value) {{ return value * {i}; }}\n"),
            )
            .unwrap();
            CompilationUnit {
                file: path,
                arguments: vec![format!("-I{}", dir.display())],
            }
        })
        .collect()
}

/// Generated test files under `output_dir`, excluding the JSON report.
pub fn generated_test_files(output_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(output_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext != "json"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}
