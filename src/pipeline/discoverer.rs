//! File discovery stage: compilation units in, per-file packets out.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::compile_db::CompilationUnit;

use super::observer::{notify_packet_processed, PipelineObserver};
use super::packet::{PacketPayload, StreamPacket, StreamStage};
use super::StageProcessor;

/// Decides which compilation units enter the pipeline.
#[derive(Debug, Clone)]
pub struct DiscoveryFilter {
    include_extensions: HashSet<String>,
    exclude_patterns: Vec<String>,
    max_file_size_mb: Option<u64>,
}

impl DiscoveryFilter {
    pub fn new(
        include_extensions: impl IntoIterator<Item = String>,
        exclude_patterns: Vec<String>,
        max_file_size_mb: Option<u64>,
    ) -> Self {
        Self {
            include_extensions: include_extensions
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            exclude_patterns,
            max_file_size_mb,
        }
    }

    /// Rejection is a filter outcome, not an error.
    pub fn should_process(&self, path: &Path) -> bool {
        let extension = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => return false,
        };
        if !self.include_extensions.contains(&extension) {
            return false;
        }

        let path_str = path.to_string_lossy();
        if self
            .exclude_patterns
            .iter()
            .any(|pattern| path_str.contains(pattern.as_str()))
        {
            return false;
        }

        if let Some(max_mb) = self.max_file_size_mb {
            if let Ok(metadata) = std::fs::metadata(path) {
                if metadata.len() > max_mb * 1024 * 1024 {
                    return false;
                }
            }
        }

        true
    }
}

impl Default for DiscoveryFilter {
    fn default() -> Self {
        Self::new(
            ["c", "cpp", "cc", "cxx", "h", "hpp", "hxx"]
                .iter()
                .map(|e| e.to_string()),
            Vec::new(),
            None,
        )
    }
}

/// Stage processor turning the seed packet into one packet per passing
/// compilation unit. Failing units are silently dropped.
pub struct FileDiscoverer {
    filter: DiscoveryFilter,
    observers: Arc<Vec<Arc<dyn PipelineObserver>>>,
    discovered: AtomicU64,
    started: Instant,
}

impl FileDiscoverer {
    pub fn new(filter: DiscoveryFilter, observers: Arc<Vec<Arc<dyn PipelineObserver>>>) -> Self {
        Self {
            filter,
            observers,
            discovered: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn discovered_count(&self) -> u64 {
        self.discovered.load(Ordering::Relaxed)
    }

    fn discover_unit(&self, parent: &StreamPacket, unit: &CompilationUnit) -> Option<StreamPacket> {
        if !self.filter.should_process(&unit.file) {
            debug!("Skipping filtered file: {}", unit.file.display());
            return None;
        }

        let sequence = self.discovered.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Discovered file: {} (#{sequence})", unit.file.display());

        Some(StreamPacket::source_file(
            parent,
            sequence,
            unit.file.clone(),
            unit.arguments.clone(),
        ))
    }
}

#[async_trait]
impl StageProcessor for FileDiscoverer {
    fn stage(&self) -> StreamStage {
        StreamStage::FileDiscovery
    }

    async fn process(&self, packet: StreamPacket) -> Vec<StreamPacket> {
        let units = match &packet.payload {
            PacketPayload::CompilationUnits(units) => units,
            _ => {
                debug!("Unexpected payload at discovery stage for {}", packet.id);
                return Vec::new();
            }
        };

        info!("Processing {} compilation units", units.len());

        let start = Instant::now();
        let outputs: Vec<StreamPacket> = units
            .iter()
            .filter_map(|unit| self.discover_unit(&packet, unit))
            .collect();

        for output in &outputs {
            notify_packet_processed(&self.observers, output, start.elapsed()).await;
        }

        outputs
    }

    async fn finalize(&self) {
        let discovered = self.discovered.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();
        info!(
            "File discovery completed: {discovered} files in {elapsed:.2}s ({:.2} files/sec)",
            discovered as f64 / elapsed.max(0.001)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn discoverer(filter: DiscoveryFilter) -> FileDiscoverer {
        FileDiscoverer::new(filter, Arc::new(Vec::new()))
    }

    fn unit(path: &str) -> CompilationUnit {
        CompilationUnit {
            file: PathBuf::from(path),
            arguments: vec!["-I.".to_string()],
        }
    }

    #[test]
    fn test_default_filter_accepts_c_family_only() {
        let filter = DiscoveryFilter::default();
        assert!(filter.should_process(Path::new("src/a.c")));
        assert!(filter.should_process(Path::new("src/b.CPP")));
        assert!(filter.should_process(Path::new("include/c.hpp")));
        assert!(!filter.should_process(Path::new("src/d.rs")));
        assert!(!filter.should_process(Path::new("README")));
    }

    #[test]
    fn test_exclude_pattern_matches_substring() {
        let filter = DiscoveryFilter::new(
            ["c".to_string()],
            vec!["third_party".to_string()],
            None,
        );
        assert!(filter.should_process(Path::new("src/a.c")));
        assert!(!filter.should_process(Path::new("third_party/lib/a.c")));
    }

    #[tokio::test]
    async fn test_fan_out_one_packet_per_passing_unit() {
        let discoverer = discoverer(DiscoveryFilter::default());
        let seed = StreamPacket::seed(
            "run",
            vec![unit("a.c"), unit("skip.py"), unit("b.cpp")],
        );

        let outputs = discoverer.process(seed).await;

        assert_eq!(outputs.len(), 2);
        assert_eq!(discoverer.discovered_count(), 2);
        for output in &outputs {
            assert_eq!(output.stage, StreamStage::FunctionProcessing);
            match &output.payload {
                PacketPayload::SourceFile {
                    file_path,
                    compile_args,
                    ..
                } => {
                    assert!(file_path.extension().is_some());
                    assert_eq!(compile_args, &vec!["-I.".to_string()]);
                }
                other => panic!("unexpected payload: {other:?}"),
            }
        }
    }
}
