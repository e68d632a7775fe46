use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tempfile::TempDir;

use testgen::llm::MockClient;
use testgen::pipeline::{
    CollectionStatus, PacketPayload, PipelineOrchestrator, StreamStage,
};

use crate::helpers::mock_analyzer::MockAnalyzer;
use crate::helpers::test_utils::{
    generated_test_files, test_dependencies, test_streaming_config, write_c_project,
};

const SAMPLE_TEST: &str = "TEST(SampleSuite, ReturnsValue) { EXPECT_EQ(1, 1); }";

#[tokio::test]
async fn test_end_to_end_writes_one_file_per_function() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 3);

    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(2)),
        Arc::new(MockClient::always_success(SAMPLE_TEST)),
        project.path(),
        output.path(),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);

    let handle = orchestrator.execute(units).await?;
    let report = handle.wait().await?;

    assert!(!report.cancelled);
    assert_eq!(report.files_discovered, 3);
    assert_eq!(report.functions_queued, 6);
    assert_eq!(report.results_collected, 6);
    assert_eq!(report.files_saved, 6);
    assert!(report.failures.is_empty());

    let files = generated_test_files(output.path());
    assert_eq!(files.len(), 6);
    for file in &files {
        let content = std::fs::read_to_string(file)?;
        assert!(content.contains(SAMPLE_TEST));
        assert!(content.contains("#include <gtest/gtest.h>"));
    }

    let report_path = output.path().join("generation_report.json");
    let report_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path)?)?;
    assert_eq!(report_json["generation_summary"]["total_functions"], 6);
    assert_eq!(report_json["generation_summary"]["successful_generations"], 6);
    assert_eq!(report_json["generated_files"].as_array().unwrap().len(), 6);

    Ok(())
}

#[tokio::test]
async fn test_terminal_packets_stream_while_running() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 2);

    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        Arc::new(MockClient::always_success(SAMPLE_TEST)),
        project.path(),
        output.path(),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);

    let mut handle = orchestrator.execute(units).await?;
    let mut seen = Vec::new();
    while let Some(packet) = handle.next_result().await {
        assert_eq!(packet.stage, StreamStage::Completed);
        if let PacketPayload::Collected { result, status, .. } = &packet.payload {
            assert_eq!(*status, CollectionStatus::Saved);
            seen.push(result.function_name.clone());
        }
    }
    assert_eq!(seen.len(), 2);

    let report = handle.wait().await?;
    assert_eq!(report.files_saved, 2);
    Ok(())
}

#[tokio::test]
async fn test_failing_file_does_not_affect_siblings() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 3);
    let bad_file = units[1].file.clone();

    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(2).failing_on(bad_file.clone())),
        Arc::new(MockClient::always_success(SAMPLE_TEST)),
        project.path(),
        output.path(),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);

    let report = orchestrator.execute(units).await?.wait().await?;

    // Two healthy files, two functions each.
    assert_eq!(report.files_saved, 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, StreamStage::FunctionProcessing);
    assert!(report.failures[0].subject.contains(
        bad_file.file_name().unwrap().to_str().unwrap()
    ));

    Ok(())
}

#[tokio::test]
async fn test_packet_ids_chain_back_to_the_run() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 1);

    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        Arc::new(MockClient::always_success(SAMPLE_TEST)),
        project.path(),
        output.path(),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);

    let mut handle = orchestrator.execute(units).await?;
    let packet = handle.next_result().await.expect("one terminal packet");

    // run-<uuid>-file-<n>-func-<name>-<n>-gen-<name>-collected-<n>
    assert!(packet.id.starts_with("run-"));
    assert!(packet.id.contains("-file-1"));
    assert!(packet.id.contains("-func-module_0_fn0-"));
    assert!(packet.id.contains("-gen-module_0_fn0"));
    assert!(packet.id.ends_with("-collected-1"));

    handle.wait().await?;
    Ok(())
}

#[tokio::test]
async fn test_existing_files_are_never_overwritten() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 1);

    let existing = output.path().join("test_module_0_fn0.c");
    std::fs::write(&existing, "// hand-written, do not touch\n")?;

    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        Arc::new(MockClient::always_success(SAMPLE_TEST)),
        project.path(),
        output.path(),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);
    let report = orchestrator.execute(units).await?.wait().await?;

    assert_eq!(report.files_saved, 1);
    assert_eq!(
        std::fs::read_to_string(&existing)?,
        "// hand-written, do not touch\n"
    );
    assert!(output.path().join("test_module_0_fn0_1.c").exists());

    Ok(())
}

#[tokio::test]
async fn test_cancellation_stops_promptly_despite_slow_provider() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 4);

    let slow_client =
        MockClient::always_success(SAMPLE_TEST).with_delay(Duration::from_secs(10));
    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(2)),
        Arc::new(slow_client),
        project.path(),
        output.path(),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);

    let handle = orchestrator.execute(units).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    orchestrator.cancel();
    let report = handle.wait().await?;

    // Stop latency is bounded by the poll interval, not the provider delay.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(report.cancelled);
    assert_eq!(report.files_saved, 0);

    Ok(())
}

#[tokio::test]
async fn test_run_timeout_is_reported_as_cancelled() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 2);

    let slow_client =
        MockClient::always_success(SAMPLE_TEST).with_delay(Duration::from_secs(10));
    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        Arc::new(slow_client),
        project.path(),
        output.path(),
    );
    let mut config = test_streaming_config();
    config.timeout_seconds = 1;
    let orchestrator = Arc::new(PipelineOrchestrator::new(config, deps)?);

    let report = orchestrator.execute(units).await?.wait().await?;

    // A run aborted by the timeout must not look like a clean completion.
    assert!(report.cancelled);
    assert_eq!(report.files_saved, 0);

    Ok(())
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_execute_is_single_shot() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 1);

    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        Arc::new(MockClient::always_success(SAMPLE_TEST)),
        project.path(),
        output.path(),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);

    let handle = orchestrator.execute(units).await?;
    handle.wait().await?;
    assert!(orchestrator.is_shutdown());

    // A second shutdown is a no-op, a second execute is a usage error.
    orchestrator.shutdown().await;
    let err = orchestrator.execute(Vec::new()).await;
    assert!(err.is_err());

    Ok(())
}

#[tokio::test]
async fn test_empty_unit_list_completes_cleanly() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;

    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        Arc::new(MockClient::always_success(SAMPLE_TEST)),
        project.path(),
        output.path(),
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);

    let report = orchestrator.execute(Vec::new()).await?.wait().await?;
    assert_eq!(report.files_discovered, 0);
    assert_eq!(report.files_saved, 0);
    assert!(!report.cancelled);
    assert!(output.path().join("generation_report.json").exists());

    Ok(())
}

#[tokio::test]
async fn test_zero_queue_size_is_rejected_at_construction() {
    let project = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        Arc::new(MockClient::always_success(SAMPLE_TEST)),
        project.path(),
        output.path(),
    );

    let mut config = test_streaming_config();
    config.max_queue_size = 0;
    assert!(PipelineOrchestrator::new(config, deps).is_err());
}
