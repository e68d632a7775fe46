//! Error types and per-item failure collection for the pipeline.
//!
//! Per-item failures never abort the run; they are recorded here and
//! surfaced through the final report and log summary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use super::packet::StreamStage;

/// Raised once, at orchestrator construction, for invalid numeric bounds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_queue_size must be positive")]
    InvalidQueueSize,
    #[error("max_concurrent_files must be positive")]
    InvalidFileConcurrency,
    #[error("max_concurrent_functions must be positive")]
    InvalidFunctionConcurrency,
    #[error("max_concurrent_llm_calls must be positive")]
    InvalidLlmConcurrency,
    #[error("timeout_seconds must be positive")]
    InvalidTimeout,
}

/// Usage errors on the orchestrator surface.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error("pipeline has been shut down")]
    ShutDown,
}

/// One recorded per-item failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub subject: String,
    pub message: String,
    #[serde(serialize_with = "serialize_stage")]
    pub stage: StreamStage,
}

fn serialize_stage<S: serde::Serializer>(
    stage: &StreamStage,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(stage.as_str())
}

/// Collects per-item failures from concurrent workers.
#[derive(Clone, Default)]
pub struct FailureCollector {
    failures: Arc<Mutex<Vec<FailureRecord>>>,
}

impl FailureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for one subject (file path or function name).
    pub fn record(&self, subject: impl Into<String>, stage: StreamStage, message: impl Into<String>) {
        let mut failures = self.failures.lock().unwrap();
        failures.push(FailureRecord {
            subject: subject.into(),
            message: message.into(),
            stage,
        });
    }

    pub fn count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }

    pub fn snapshot(&self) -> Vec<FailureRecord> {
        self.failures.lock().unwrap().clone()
    }

    /// Failure counts grouped by stage, for the log summary.
    pub fn by_stage(&self) -> HashMap<StreamStage, usize> {
        let failures = self.failures.lock().unwrap();
        let mut counts = HashMap::new();
        for failure in failures.iter() {
            *counts.entry(failure.stage).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_grouped_by_stage() {
        let collector = FailureCollector::new();
        collector.record("a.c", StreamStage::FunctionProcessing, "parse error");
        collector.record("b.c", StreamStage::FunctionProcessing, "missing file");
        collector.record("frob", StreamStage::LlmProcessing, "timeout");

        assert_eq!(collector.count(), 3);
        let by_stage = collector.by_stage();
        assert_eq!(by_stage[&StreamStage::FunctionProcessing], 2);
        assert_eq!(by_stage[&StreamStage::LlmProcessing], 1);
    }

    #[test]
    fn test_collector_shares_state_across_clones() {
        let collector = FailureCollector::new();
        let clone = collector.clone();
        clone.record("x", StreamStage::ResultCollection, "disk full");
        assert_eq!(collector.count(), 1);
    }
}
