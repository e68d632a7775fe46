//! Functions command: list the testable functions the pipeline would
//! process, without calling the provider.

use std::env;
use std::path::PathBuf;

use anyhow::Result;

use crate::analyzer::{SourceAnalyzer, TreeSitterAnalyzer};
use crate::compile_db;
use crate::pipeline::functions::function_priority;
use crate::pipeline::FunctionFilter;
use crate::Config;

pub async fn run(compile_commands: Option<PathBuf>) -> Result<()> {
    let root = env::current_dir()?;
    let config = Config::load(&root)?;

    let units = compile_db::resolve_units(
        &root,
        compile_commands.as_deref(),
        &config.discovery.extensions,
    )?;

    let analyzer = TreeSitterAnalyzer::new();
    let filter = FunctionFilter {
        skip_static: config.functions.skip_static,
        skip_test_functions: config.functions.skip_test_functions,
        min_parameters: config.functions.min_parameters,
        max_parameters: Some(config.functions.max_parameters),
    };

    let mut total = 0usize;
    for unit in &units {
        let functions = match analyzer.analyze(&unit.file, &unit.arguments) {
            Ok(functions) => functions,
            Err(e) => {
                eprintln!("Skipping {}: {e:#}", unit.file.display());
                continue;
            }
        };

        let testable: Vec<_> = functions
            .iter()
            .filter(|f| filter.should_process(f))
            .collect();
        if testable.is_empty() {
            continue;
        }

        println!("{}:", unit.file.display());
        for function in testable {
            println!(
                "  [p{}] {}",
                function_priority(function),
                function.signature()
            );
            total += 1;
        }
    }

    println!("\n{total} testable functions in {} units", units.len());
    Ok(())
}
