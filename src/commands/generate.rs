//! Generate command: run the streaming pipeline over the project's
//! compilation units and report what was written.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::analyzer::TreeSitterAnalyzer;
use crate::compile_db;
use crate::llm;
use crate::pipeline::{
    CollectionStatus, DiscoveryFilter, FunctionFilter, PacketPayload, PipelineDependencies,
    PipelineOrchestrator, ProgressObserver,
};
use crate::Config;

pub async fn run(
    compile_commands: Option<PathBuf>,
    output: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let root = env::current_dir()?;
    let config = Config::load(&root)?;

    let units = compile_db::resolve_units(
        &root,
        compile_commands.as_deref(),
        &config.discovery.extensions,
    )?;
    if units.is_empty() {
        bail!("No compilation units found under {}", root.display());
    }

    if dry_run {
        println!("Would process {} compilation units:", units.len());
        for unit in &units {
            println!("  {}", unit.file.display());
        }
        return Ok(());
    }

    let output_dir = output.unwrap_or_else(|| config.output_dir(&root));
    let llm_client = llm::build_client(&config.llm)?;

    let deps = PipelineDependencies {
        analyzer: Arc::new(TreeSitterAnalyzer::new()),
        llm_client,
        discovery_filter: DiscoveryFilter::new(
            config.discovery.extensions.clone(),
            config.discovery.exclude_patterns.clone(),
            Some(config.discovery.max_file_size_mb),
        ),
        function_filter: FunctionFilter {
            skip_static: config.functions.skip_static,
            skip_test_functions: config.functions.skip_test_functions,
            min_parameters: config.functions.min_parameters,
            max_parameters: Some(config.functions.max_parameters),
        },
        project_root: root.clone(),
        output_dir: output_dir.clone(),
        observers: vec![Arc::new(ProgressObserver::new())],
    };

    let orchestrator = Arc::new(PipelineOrchestrator::new(config.streaming.clone(), deps)?);

    // First Ctrl-C cancels gracefully, a second one aborts the process.
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling... press Ctrl-C again to abort");
                orchestrator.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    }

    let total_units = units.len();
    let mut handle = orchestrator.execute(units).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    spinner.set_message(format!("Processing {total_units} compilation units"));

    let mut saved = 0u64;
    let mut failed = 0u64;
    while let Some(packet) = handle.next_result().await {
        if let PacketPayload::Collected { result, status, .. } = &packet.payload {
            match status {
                CollectionStatus::Saved => saved += 1,
                CollectionStatus::Failed => failed += 1,
            }
            spinner.set_message(format!(
                "{saved} tests written, {failed} failed (last: {})",
                result.function_name
            ));
        }
        spinner.tick();
    }

    let report = handle.wait().await?;
    spinner.finish_and_clear();

    info!(
        "Generation run finished: {} saved, {} failures",
        report.files_saved,
        report.failures.len()
    );

    if report.cancelled {
        println!("Run cancelled.");
    }
    println!(
        "Processed {} packets in {:.2}s",
        report.packets_processed,
        report.elapsed.as_secs_f64()
    );
    println!(
        "  Files discovered:  {}",
        report.files_discovered
    );
    println!(
        "  Functions queued:  {}",
        report.functions_queued
    );
    println!(
        "  Tests written:     {} (of {} collected)",
        report.files_saved, report.results_collected
    );

    if !report.suite_summary.is_empty() {
        println!("\nPer-suite results:");
        for (suite, stats) in &report.suite_summary {
            println!(
                "  {suite}: {}/{} succeeded",
                stats.successful, stats.total
            );
        }
    }

    if !report.failures.is_empty() {
        println!("\nFailures ({}):", report.failures.len());
        for failure in &report.failures {
            println!("  [{}] {}: {}", failure.stage, failure.subject, failure.message);
        }
    }

    println!(
        "\nOutput directory: {}",
        output_dir.display()
    );

    Ok(())
}
