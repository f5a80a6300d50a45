//! End-to-end analysis of one job.
//!
//! Sampling is sequential; detection calls run on a `JoinSet` bounded by a
//! semaphore. A permit is taken before the sampler is polled, so decoding
//! stalls while the detection stage is saturated.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use bv_media::{Frame, FrameSampler, FrameStream, MediaError, VideoSource};
use bv_models::{
    active_products, AnalysisConfig, AnalysisResult, ConfigError, JobState, ProductId,
    RawDetection, ReferenceProduct,
};
use bv_vision_client::{DetectionClient, FrameDropped};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, Instrument};

use crate::config::WorkerConfig;
use crate::dedup::TemporalDeduplicator;
use crate::error::{AnalysisError, WorkerResult};
use crate::intervals::IntervalAggregator;
use crate::job::AnalysisJob;
use crate::metrics;
use crate::report::{FrameCoverage, ReportBuilder};

type FrameOutcome = (u64, Result<Vec<RawDetection>, FrameDropped>);

/// Why the detection stage stopped emitting frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    EndOfStream,
    SourceError,
    TimedOut,
}

/// Frame accounting for the detection stage.
#[derive(Debug, Default)]
struct DetectionTally {
    emitted: u64,
    processed: u64,
    dropped: u64,
}

impl DetectionTally {
    fn done(&self) -> u64 {
        self.processed + self.dropped
    }
}

/// Runs jobs through sampling, detection, deduplication and aggregation.
#[derive(Clone)]
pub struct AnalysisPipeline {
    client: DetectionClient,
    config: WorkerConfig,
}

impl AnalysisPipeline {
    pub fn new(client: DetectionClient, config: WorkerConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn client(&self) -> &DetectionClient {
        &self.client
    }

    /// Drive `job` to a terminal state.
    ///
    /// On error the job is left for the caller to fail with the matching reason.
    pub async fn run(&self, job: &AnalysisJob, source: &dyn VideoSource) -> WorkerResult<()> {
        let span = job.logger().create_span();
        self.run_inner(job, source).instrument(span).await
    }

    async fn run_inner(&self, job: &AnalysisJob, source: &dyn VideoSource) -> WorkerResult<()> {
        let config = *job.config();
        config.validate()?;

        let products = active_products(job.products());
        if products.is_empty() {
            return Err(ConfigError::EmptyProductSet.into());
        }

        let mut cancel = job.cancel_receiver();
        let deadline = self.config.job_timeout.map(|t| Instant::now() + t);

        job.logger().log_start(&format!(
            "{} at {} fps, {} active product(s)",
            source.describe(),
            config.frame_rate,
            products.len()
        ));

        job.transition(JobState::Sampling).await?;
        let sampler = FrameSampler::new(config.frame_rate)?;
        let mut stream = tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancel) => return Err(AnalysisError::Cancelled),
            opened = sampler.sample(source) => opened?,
        };
        let metadata = stream.metadata().clone();
        let expected = stream.expected_frames();

        job.set_expected_frames(expected).await;

        let (detections, tally, stop) = self
            .detect_frames(job, &mut stream, Arc::new(products.clone()), &config, &mut cancel, deadline)
            .await?;
        drop(stream);

        let coverage = coverage_for(&tally, expected, stop, self.config.failure_threshold);
        if stop == StopCause::TimedOut && tally.processed == 0 {
            return Err(AnalysisError::TimedOut);
        }
        if stop == StopCause::SourceError && tally.emitted == 0 {
            return Err(MediaError::source_unavailable("no frame could be decoded").into());
        }

        // A video too short to yield a frame still passes through detection
        if tally.emitted == 0 {
            job.transition(JobState::Detecting).await?;
        }

        let degraded = coverage.partial;
        if degraded {
            job.logger().log_warning(&AnalysisError::ThresholdExceeded {
                dropped: coverage.dropped,
                attempted: coverage.attempted,
            }
            .to_string());
        }

        job.transition(JobState::Aggregating).await?;
        let result = aggregate(&config, &metadata, &products, detections, coverage)?;
        metrics::record_detections_kept(result.total_detections as u64);

        if *cancel.borrow() {
            return Err(AnalysisError::Cancelled);
        }
        job.complete(result, degraded).await
    }

    /// Feed frames to the detection client until the stream ends, the
    /// deadline passes, or the job is cancelled.
    async fn detect_frames(
        &self,
        job: &AnalysisJob,
        stream: &mut FrameStream,
        products: Arc<Vec<ReferenceProduct>>,
        config: &AnalysisConfig,
        cancel: &mut watch::Receiver<bool>,
        deadline: Option<Instant>,
    ) -> WorkerResult<(TemporalDeduplicator, DetectionTally, StopCause)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_inflight_detections.max(1)));
        let mut tasks: JoinSet<FrameOutcome> = JoinSet::new();
        let mut dedup = TemporalDeduplicator::new(config);
        let mut tally = DetectionTally::default();
        let mut stop = StopCause::EndOfStream;

        'emit: loop {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = wait_cancelled(cancel) => return Err(AnalysisError::Cancelled),
                    _ = wait_deadline(deadline) => {
                        stop = StopCause::TimedOut;
                        break 'emit;
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        self.settle(job, joined, &mut dedup, &mut tally).await;
                    }
                    permit = semaphore.clone().acquire_owned() => {
                        break permit.map_err(|_| AnalysisError::internal("detection semaphore closed"))?;
                    }
                }
            };

            let next = tokio::select! {
                biased;
                _ = wait_cancelled(cancel) => return Err(AnalysisError::Cancelled),
                _ = wait_deadline(deadline) => {
                    stop = StopCause::TimedOut;
                    break 'emit;
                }
                next = stream.next_frame() => next,
            };

            let frame: Frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    job.logger().log_warning(&format!("decode stopped early: {}", e));
                    stop = StopCause::SourceError;
                    break;
                }
            };

            if tally.emitted == 0 {
                job.transition(JobState::Detecting).await?;
            }
            tally.emitted += 1;
            metrics::record_frame_sampled();

            let client = self.client.clone();
            let products = Arc::clone(&products);
            let sensitivity = config.sensitivity;
            tasks.spawn(async move {
                let _permit = permit;
                let started = StdInstant::now();
                let outcome = client.detect(&frame, &products, sensitivity).await;
                metrics::record_detection_call(started.elapsed().as_secs_f64());
                (frame.index, outcome)
            });
        }

        if stop != StopCause::TimedOut {
            while !tasks.is_empty() {
                tokio::select! {
                    biased;
                    _ = wait_cancelled(cancel) => return Err(AnalysisError::Cancelled),
                    _ = wait_deadline(deadline) => {
                        stop = StopCause::TimedOut;
                        break;
                    }
                    Some(joined) = tasks.join_next() => {
                        self.settle(job, joined, &mut dedup, &mut tally).await;
                    }
                }
            }
        }

        // Whatever is still in flight missed the deadline
        tasks.abort_all();
        Ok((dedup, tally, stop))
    }

    async fn settle(
        &self,
        job: &AnalysisJob,
        joined: Result<FrameOutcome, tokio::task::JoinError>,
        dedup: &mut TemporalDeduplicator,
        tally: &mut DetectionTally,
    ) {
        match joined {
            Ok((index, Ok(detections))) => {
                debug!(frame = index, detections = detections.len(), "Frame processed");
                tally.processed += 1;
                dedup.extend(detections);
            }
            Ok((_, Err(dropped))) => {
                tally.dropped += 1;
                metrics::record_frames_dropped("detection", 1);
                job.logger().log_warning(&AnalysisError::from(dropped).to_string());
            }
            Err(e) => {
                tally.dropped += 1;
                metrics::record_frames_dropped("detection", 1);
                job.logger().log_error(&format!("detection task failed: {}", e));
            }
        }
        job.record_frames_done(tally.done()).await;
    }
}

/// Frames that never completed count as dropped when the run was cut short.
///
/// The result is partial after a timeout or when the drop ratio exceeds
/// `failure_threshold`.
fn coverage_for(
    tally: &DetectionTally,
    expected: u64,
    stop: StopCause,
    failure_threshold: f64,
) -> FrameCoverage {
    let finished_early = stop != StopCause::EndOfStream;
    let attempted = if finished_early {
        expected.max(tally.done())
    } else {
        tally.emitted
    };
    let dropped = attempted.saturating_sub(tally.processed);

    let missed = dropped.saturating_sub(tally.dropped);
    if missed > 0 {
        let cause = if stop == StopCause::TimedOut { "timeout" } else { "source" };
        metrics::record_frames_dropped(cause, missed);
    }

    let mut coverage = FrameCoverage {
        attempted,
        dropped,
        partial: false,
    };
    coverage.partial = stop == StopCause::TimedOut || coverage.drop_ratio() > failure_threshold;
    coverage
}

fn aggregate(
    config: &AnalysisConfig,
    metadata: &bv_models::VideoMetadata,
    products: &[ReferenceProduct],
    dedup: TemporalDeduplicator,
    coverage: FrameCoverage,
) -> WorkerResult<AnalysisResult> {
    let aggregator = IntervalAggregator::new(config, metadata.duration_seconds);
    let mut detections = dedup.finish();

    let aggregates: BTreeMap<ProductId, _> = products
        .iter()
        .map(|product| {
            let kept = detections.remove(&product.id).unwrap_or_default();
            (product.id.clone(), aggregator.aggregate(product, &kept))
        })
        .collect();

    ReportBuilder::build(metadata, products, aggregates, coverage)
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
