use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use testgen::llm::{LlmClient, MockClient};
use testgen::pipeline::{PipelineOrchestrator, StreamStage};

use crate::helpers::mock_analyzer::MockAnalyzer;
use crate::helpers::test_utils::{
    generated_test_files, test_dependencies, test_streaming_config, write_c_project,
};

const SAMPLE_TEST: &str = "TEST(RetrySuite, Works) { EXPECT_TRUE(true); }";

#[tokio::test]
async fn test_transient_failure_is_retried_until_success() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 1);

    let client = Arc::new(MockClient::fail_times(1, "connection reset", SAMPLE_TEST));
    let dyn_client: Arc<dyn LlmClient> = client.clone();
    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        dyn_client,
        project.path(),
        output.path(),
    );

    // retry_attempts = 1 allows two attempts total.
    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);
    let report = orchestrator.execute(units).await?.wait().await?;

    assert_eq!(client.calls(), 2);
    assert_eq!(report.files_saved, 1);
    assert!(report.failures.is_empty());
    assert_eq!(generated_test_files(output.path()).len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_fail_only_that_function() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 1);

    let client = Arc::new(MockClient::always_fail("connection reset"));
    let dyn_client: Arc<dyn LlmClient> = client.clone();
    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        dyn_client,
        project.path(),
        output.path(),
    );

    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);
    let report = orchestrator.execute(units).await?.wait().await?;

    // One initial attempt plus one retry.
    assert_eq!(client.calls(), 2);
    assert_eq!(report.files_saved, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, StreamStage::LlmProcessing);
    assert_eq!(report.failures[0].subject, "module_0_fn0");
    assert!(report.failures[0].message.contains("connection reset"));

    Ok(())
}

#[tokio::test]
async fn test_non_retryable_error_skips_remaining_retries() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 1);

    let client = Arc::new(MockClient::always_fail("quota exceeded"));
    let dyn_client: Arc<dyn LlmClient> = client.clone();
    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        dyn_client,
        project.path(),
        output.path(),
    );

    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);
    let report = orchestrator.execute(units).await?.wait().await?;

    // Retries would be pointless; exactly one attempt is made.
    assert_eq!(client.calls(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].message.contains("quota exceeded"));

    Ok(())
}

#[tokio::test]
async fn test_empty_provider_response_counts_as_failed_attempt() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 1);

    let client = Arc::new(MockClient::always_success("   "));
    let dyn_client: Arc<dyn LlmClient> = client.clone();
    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        dyn_client,
        project.path(),
        output.path(),
    );

    let orchestrator = Arc::new(PipelineOrchestrator::new(test_streaming_config(), deps)?);
    let report = orchestrator.execute(units).await?.wait().await?;

    assert_eq!(client.calls(), 2);
    assert_eq!(report.files_saved, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].message.contains("empty result"));

    Ok(())
}

#[tokio::test]
async fn test_failed_generations_appear_in_report_json() -> Result<()> {
    let project = TempDir::new()?;
    let output = TempDir::new()?;
    let units = write_c_project(project.path(), 2);

    // First function fails permanently, subsequent ones succeed.
    let client = Arc::new(MockClient::fail_times(1, "model not found", SAMPLE_TEST));
    let dyn_client: Arc<dyn LlmClient> = client.clone();
    let deps = test_dependencies(
        Arc::new(MockAnalyzer::new(1)),
        dyn_client,
        project.path(),
        output.path(),
    );

    let mut config = test_streaming_config();
    config.max_concurrent_functions = 1;
    let orchestrator = Arc::new(PipelineOrchestrator::new(config, deps)?);
    let report = orchestrator.execute(units).await?.wait().await?;

    assert_eq!(report.files_saved, 1);
    assert_eq!(report.failures.len(), 1);

    let report_json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        output.path().join("generation_report.json"),
    )?)?;
    let failures = report_json["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["stage"], "llm_processing");
    assert!(failures[0]["message"]
        .as_str()
        .unwrap()
        .contains("model not found"));

    Ok(())
}
