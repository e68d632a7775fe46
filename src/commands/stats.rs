//! Stats command for displaying pipeline metrics

use anyhow::Result;

use crate::metrics::{
    gather_metrics, FILES_WRITTEN, LLM_FAILURES, LLM_LATENCY, LLM_REQUESTS, PACKETS_PROCESSED,
    PIPELINE_ERRORS,
};

/// Run the stats command
///
/// # Arguments
/// * `prometheus` - If true, output in Prometheus text format
pub async fn run(prometheus: bool) -> Result<()> {
    if prometheus {
        print!("{}", gather_metrics());
        return Ok(());
    }

    println!("testgen Pipeline Metrics");
    println!("========================\n");

    println!("Packet Flow:");
    println!("  Packets processed: {:.0}", PACKETS_PROCESSED.get());
    println!("  Per-item failures: {:.0}", PIPELINE_ERRORS.get());
    println!();

    println!("LLM Calls:");
    println!("  Total attempts:    {:.0}", LLM_REQUESTS.get());
    println!("  Failed attempts:   {:.0}", LLM_FAILURES.get());
    let samples = LLM_LATENCY.get_sample_count();
    if samples > 0 {
        println!(
            "  Average latency:   {:.3}s",
            LLM_LATENCY.get_sample_sum() / samples as f64
        );
    }
    println!();

    println!("Output:");
    println!("  Test files written: {:.0}", FILES_WRITTEN.get());

    Ok(())
}
