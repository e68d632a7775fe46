//! Read-only observation of pipeline activity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::metrics;

use super::packet::{StreamPacket, StreamStage};

/// Point-in-time pipeline metrics handed to observers.
#[derive(Debug, Clone, Copy)]
pub struct StageMetrics {
    pub packets_processed: u64,
    pub errors: u64,
    pub elapsed: Duration,
    pub throughput: f64,
}

/// Read-only sink for pipeline events.
///
/// Callbacks return `Result` so implementations can fail; the notify loops
/// log and swallow each failure so one observer can never affect another or
/// the pipeline itself.
#[async_trait]
pub trait PipelineObserver: Send + Sync {
    async fn on_packet_processed(&self, packet: &StreamPacket, duration: Duration) -> Result<()>;

    async fn on_error(&self, packet: &StreamPacket, message: &str) -> Result<()>;

    async fn on_stage_changed(&self, stage: StreamStage, metrics: StageMetrics) -> Result<()>;
}

/// Notify all observers of a processed packet, isolating failures.
pub async fn notify_packet_processed(
    observers: &[std::sync::Arc<dyn PipelineObserver>],
    packet: &StreamPacket,
    duration: Duration,
) {
    for observer in observers {
        if let Err(e) = observer.on_packet_processed(packet, duration).await {
            warn!("Observer failed in on_packet_processed: {e:#}");
        }
    }
}

/// Notify all observers of an error, isolating failures.
pub async fn notify_error(
    observers: &[std::sync::Arc<dyn PipelineObserver>],
    packet: &StreamPacket,
    message: &str,
) {
    for observer in observers {
        if let Err(e) = observer.on_error(packet, message).await {
            warn!("Observer failed in on_error: {e:#}");
        }
    }
}

/// Notify all observers of a stage change, isolating failures.
pub async fn notify_stage_changed(
    observers: &[std::sync::Arc<dyn PipelineObserver>],
    stage: StreamStage,
    metrics: StageMetrics,
) {
    for observer in observers {
        if let Err(e) = observer.on_stage_changed(stage, metrics).await {
            warn!("Observer failed in on_stage_changed: {e:#}");
        }
    }
}

/// Logs periodic progress and a final summary.
pub struct ProgressObserver {
    started: Instant,
    packets: AtomicU64,
    errors: AtomicU64,
    interval: Duration,
    last_report: Mutex<Instant>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(5))
    }

    pub fn with_interval(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            packets: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            interval,
            last_report: Mutex::new(now),
        }
    }

    pub fn summary(&self) -> String {
        let packets = self.packets.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();
        format!(
            "{packets} packets, {errors} errors, {:.1} packets/sec",
            packets as f64 / elapsed.max(0.001)
        )
    }

    fn maybe_report(&self) {
        let mut last = self.last_report.lock().unwrap();
        if last.elapsed() >= self.interval {
            info!("Pipeline progress: {}", self.summary());
            *last = Instant::now();
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineObserver for ProgressObserver {
    async fn on_packet_processed(&self, _packet: &StreamPacket, _duration: Duration) -> Result<()> {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.maybe_report();
        Ok(())
    }

    async fn on_error(&self, packet: &StreamPacket, message: &str) -> Result<()> {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!("Pipeline error for {}: {}", packet.id, message);
        Ok(())
    }

    async fn on_stage_changed(&self, _stage: StreamStage, _metrics: StageMetrics) -> Result<()> {
        Ok(())
    }
}

/// Feeds pipeline events into the Prometheus registry.
pub struct MetricsObserver;

#[async_trait]
impl PipelineObserver for MetricsObserver {
    async fn on_packet_processed(&self, packet: &StreamPacket, duration: Duration) -> Result<()> {
        metrics::PACKETS_PROCESSED.inc();
        metrics::packet_counter(packet.stage).inc();
        metrics::PACKET_LATENCY.observe(duration.as_secs_f64());
        Ok(())
    }

    async fn on_error(&self, _packet: &StreamPacket, _message: &str) -> Result<()> {
        metrics::PIPELINE_ERRORS.inc();
        Ok(())
    }

    async fn on_stage_changed(&self, _stage: StreamStage, _metrics: StageMetrics) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct FailingObserver;

    #[async_trait]
    impl PipelineObserver for FailingObserver {
        async fn on_packet_processed(&self, _: &StreamPacket, _: Duration) -> Result<()> {
            Err(anyhow!("observer bug"))
        }
        async fn on_error(&self, _: &StreamPacket, _: &str) -> Result<()> {
            Err(anyhow!("observer bug"))
        }
        async fn on_stage_changed(&self, _: StreamStage, _: StageMetrics) -> Result<()> {
            Err(anyhow!("observer bug"))
        }
    }

    struct CountingObserver(AtomicUsize);

    #[async_trait]
    impl PipelineObserver for CountingObserver {
        async fn on_packet_processed(&self, _: &StreamPacket, _: Duration) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn on_error(&self, _: &StreamPacket, _: &str) -> Result<()> {
            Ok(())
        }
        async fn on_stage_changed(&self, _: StreamStage, _: StageMetrics) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_affect_others() {
        let counting = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let observers: Vec<Arc<dyn PipelineObserver>> =
            vec![Arc::new(FailingObserver), counting.clone()];

        let packet = StreamPacket::seed("run", vec![]);
        notify_packet_processed(&observers, &packet, Duration::from_millis(1)).await;
        notify_packet_processed(&observers, &packet, Duration::from_millis(1)).await;

        assert_eq!(counting.0.load(Ordering::SeqCst), 2);
    }
}
