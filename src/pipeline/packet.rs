//! Packet data model for the streaming pipeline.
//!
//! Packets are immutable envelopes; a stage transition always constructs a
//! new packet whose id extends the producing packet's id, so every result
//! can be traced back to the compilation unit that started it.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::analyzer::FunctionInfo;
use crate::compile_db::CompilationUnit;

/// The ordered stages a packet passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamStage {
    FileDiscovery,
    FunctionProcessing,
    LlmProcessing,
    ResultCollection,
    Completed,
}

impl StreamStage {
    pub const ALL: [StreamStage; 5] = [
        StreamStage::FileDiscovery,
        StreamStage::FunctionProcessing,
        StreamStage::LlmProcessing,
        StreamStage::ResultCollection,
        StreamStage::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStage::FileDiscovery => "file_discovery",
            StreamStage::FunctionProcessing => "function_processing",
            StreamStage::LlmProcessing => "llm_processing",
            StreamStage::ResultCollection => "result_collection",
            StreamStage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for StreamStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage-tagged payload. The constructors on [`StreamPacket`] are the only
/// way to build a packet, which keeps stage and payload shape in lockstep.
#[derive(Debug, Clone)]
pub enum PacketPayload {
    /// Seed payload: everything the pipeline will process.
    CompilationUnits(Vec<CompilationUnit>),
    /// One discovered source file.
    SourceFile {
        file_path: PathBuf,
        compile_args: Vec<String>,
        sequence: u64,
    },
    /// One function awaiting generation.
    Function(FunctionWorkItem),
    /// One finished generation awaiting persistence.
    Generation(GenerationResult),
    /// Terminal payload handed to the caller.
    Collected {
        result: GenerationResult,
        output_path: Option<PathBuf>,
        status: CollectionStatus,
    },
}

/// Immutable envelope flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct StreamPacket {
    pub stage: StreamStage,
    pub payload: PacketPayload,
    pub timestamp: Instant,
    pub id: String,
}

impl StreamPacket {
    fn new(stage: StreamStage, payload: PacketPayload, id: String) -> Self {
        Self {
            stage,
            payload,
            timestamp: Instant::now(),
            id,
        }
    }

    /// Seed packet carrying all compilation units.
    pub fn seed(run_id: &str, units: Vec<CompilationUnit>) -> Self {
        Self::new(
            StreamStage::FileDiscovery,
            PacketPayload::CompilationUnits(units),
            run_id.to_string(),
        )
    }

    /// Per-file packet emitted by discovery.
    pub fn source_file(
        parent: &StreamPacket,
        sequence: u64,
        file_path: PathBuf,
        compile_args: Vec<String>,
    ) -> Self {
        Self::new(
            StreamStage::FunctionProcessing,
            PacketPayload::SourceFile {
                file_path,
                compile_args,
                sequence,
            },
            format!("{}-file-{}", parent.id, sequence),
        )
    }

    /// Per-function packet emitted by function processing.
    pub fn function(parent: &StreamPacket, sequence: u64, item: FunctionWorkItem) -> Self {
        let name = item.function.name.clone();
        Self::new(
            StreamStage::LlmProcessing,
            PacketPayload::Function(item),
            format!("{}-func-{}-{}", parent.id, name, sequence),
        )
    }

    /// Generation result packet emitted by the LLM stage.
    pub fn generation(parent: &StreamPacket, result: GenerationResult) -> Self {
        let name = result.function_name.clone();
        Self::new(
            StreamStage::ResultCollection,
            PacketPayload::Generation(result),
            format!("{}-gen-{}", parent.id, name),
        )
    }

    /// Terminal packet emitted by the collector.
    pub fn completed(
        parent: &StreamPacket,
        sequence: u64,
        result: GenerationResult,
        output_path: Option<PathBuf>,
        status: CollectionStatus,
    ) -> Self {
        Self::new(
            StreamStage::Completed,
            PacketPayload::Collected {
                result,
                output_path,
                status,
            },
            format!("{}-collected-{}", parent.id, sequence),
        )
    }
}

/// Outcome of persisting one generation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Saved,
    Failed,
}

/// Highest assignable function priority.
pub const MAX_PRIORITY: u8 = 10;

/// One function queued for test generation.
#[derive(Debug, Clone)]
pub struct FunctionWorkItem {
    pub file_path: PathBuf,
    pub function: FunctionInfo,
    pub compile_args: Vec<String>,
    pub priority: u8,
}

impl FunctionWorkItem {
    pub fn new(
        file_path: PathBuf,
        function: FunctionInfo,
        compile_args: Vec<String>,
        priority: u8,
    ) -> Self {
        Self {
            file_path,
            function,
            compile_args,
            priority: priority.min(MAX_PRIORITY),
        }
    }

    /// Copy with a different priority, clamped to the valid range.
    pub fn with_priority(&self, priority: u8) -> Self {
        Self {
            priority: priority.min(MAX_PRIORITY),
            ..self.clone()
        }
    }
}

/// The outcome of one generation attempt chain for a function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub function_name: String,
    pub suite_name: String,
    pub target_path: String,
    pub success: bool,
    pub test_code: String,
    #[serde(skip_serializing, default)]
    pub prompt: String,
    pub model: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{ParameterInfo, SourceLanguage};

    fn function_info(name: &str) -> FunctionInfo {
        FunctionInfo {
            name: name.to_string(),
            return_type: "int".to_string(),
            parameters: vec![ParameterInfo {
                name: "x".to_string(),
                type_name: "int".to_string(),
                position: 0,
            }],
            is_static: false,
            language: SourceLanguage::C,
            file: PathBuf::from("a.c"),
            line: 1,
            body: String::new(),
        }
    }

    #[test]
    fn test_stage_ordering() {
        assert!(StreamStage::FileDiscovery < StreamStage::FunctionProcessing);
        assert!(StreamStage::FunctionProcessing < StreamStage::LlmProcessing);
        assert!(StreamStage::LlmProcessing < StreamStage::ResultCollection);
        assert!(StreamStage::ResultCollection < StreamStage::Completed);
    }

    #[test]
    fn test_packet_ids_chain_through_stages() {
        let seed = StreamPacket::seed("run-1", vec![]);
        let file = StreamPacket::source_file(&seed, 1, PathBuf::from("a.c"), vec![]);
        assert_eq!(file.id, "run-1-file-1");
        assert_eq!(file.stage, StreamStage::FunctionProcessing);

        let item = FunctionWorkItem::new(PathBuf::from("a.c"), function_info("add"), vec![], 3);
        let func = StreamPacket::function(&file, 7, item);
        assert_eq!(func.id, "run-1-file-1-func-add-7");
        assert_eq!(func.stage, StreamStage::LlmProcessing);
    }

    #[test]
    fn test_priority_is_clamped() {
        let item = FunctionWorkItem::new(PathBuf::from("a.c"), function_info("f"), vec![], 99);
        assert_eq!(item.priority, MAX_PRIORITY);

        let bumped = item.with_priority(4);
        assert_eq!(bumped.priority, 4);
        // original untouched
        assert_eq!(item.priority, MAX_PRIORITY);
    }
}
